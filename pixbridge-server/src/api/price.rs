use axum::{Json, Router, extract::State, routing::get};
use pixbridge_sdk::objects::PriceResponse;

use crate::api::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/price", get(get_price))
}

/// `GET /price` — the oracle's current USDT/BRL rate.
async fn get_price(State(state): State<AppState>) -> Result<Json<PriceResponse>, ApiError> {
    let brl = state.service.current_rate().await?;
    Ok(Json(PriceResponse { brl }))
}
