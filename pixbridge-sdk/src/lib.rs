//! Wire types and signing helpers shared by the pixbridge server and its callers.

pub mod objects;
pub mod signature;
