//! On-ramp buy order handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use pixbridge_sdk::objects::{BuyOrderResponse, CreateBuyOrderRequest};
use uuid::Uuid;

use crate::api::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/buy-orders", post(create_buy_order))
        .route("/buy-orders/{buy_order_id}", get(get_buy_order))
}

/// `POST /buy-orders` — quote and persist an order awaiting its PIX charge.
async fn create_buy_order(
    State(state): State<AppState>,
    Json(request): Json<CreateBuyOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.service.create_buy_order(request).await?;
    Ok((StatusCode::CREATED, Json(BuyOrderResponse::from(order))))
}

async fn get_buy_order(
    State(state): State<AppState>,
    Path(buy_order_id): Path<Uuid>,
) -> Result<Json<BuyOrderResponse>, ApiError> {
    let order = state.service.get_buy_order(buy_order_id).await?;
    Ok(Json(order.into()))
}
