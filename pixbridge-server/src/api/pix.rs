//! PIX provider callbacks.

use axum::{Json, Router, extract::State, routing::post};
use pixbridge_sdk::objects::{ProviderWebhook, WebhookAck};

use crate::api::ApiError;
use crate::api::extractors::{ProviderSecret, SignedBody};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/pix/webhook", post(provider_webhook))
}

/// `POST /pix/webhook` — signed with the provider-issued secret.
async fn provider_webhook(
    State(state): State<AppState>,
    SignedBody(webhook, _): SignedBody<ProviderWebhook, ProviderSecret>,
) -> Result<Json<WebhookAck>, ApiError> {
    tracing::info!(
        provider_id = %webhook.id,
        reference = %webhook.reference,
        status = ?webhook.status,
        "Provider webhook received"
    );
    let ack = state.service.handle_provider_webhook(webhook).await?;
    Ok(Json(ack))
}
