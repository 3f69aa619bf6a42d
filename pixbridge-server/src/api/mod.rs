//! HTTP API.
//!
//! # Endpoints
//!
//! - `GET  /price`                  – current USDT/BRL rate
//! - `POST /orders`                 – create an off-ramp order
//! - `GET  /orders/{id}`            – fetch an order
//! - `GET  /orders/{id}/stream`     – server-sent status frames
//! - `POST /orders/{id}/deposit`    – signed deposit notification
//! - `POST /orders/{id}/payout`     – signed payout notification
//! - `POST /buy-orders`             – create an on-ramp order
//! - `GET  /buy-orders/{id}`        – fetch a buy order
//! - `POST /pix/webhook`            – signed PIX provider callback

pub mod buy_orders;
pub mod extractors;
pub mod orders;
pub mod pix;
pub mod price;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pixbridge_core::chain::AllocatorError;
use pixbridge_core::service::ServiceError;
use serde::Serialize;

use crate::state::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(price::router())
        .merge(orders::router())
        .merge(buy_orders::router())
        .merge(pix::router())
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// A [`ServiceError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Validation(_) | ServiceError::Quote(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidTransition(_) => StatusCode::CONFLICT,
            ServiceError::NotConfigured(_)
            | ServiceError::Price(_)
            | ServiceError::Allocator(AllocatorError::MissingXpub) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Allocator(_) | ServiceError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "API request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}
