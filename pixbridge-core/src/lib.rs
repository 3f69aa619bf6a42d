#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod chain;
pub mod clients;
pub mod config;
pub mod entities;
pub mod events;
pub mod oracle;
pub mod pricing;
pub mod processors;
pub mod service;
pub mod store;
