//! Application state shared across all request handlers.

use crate::config::runtime::Secrets;
use pixbridge_core::service::OrderService;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    /// Shared secrets of the HMAC-authenticated endpoints.
    pub secrets: Arc<Secrets>,
}

impl AppState {
    pub fn new(service: Arc<OrderService>, secrets: Secrets) -> Self {
        Self {
            service,
            secrets: Arc::new(secrets),
        }
    }
}
