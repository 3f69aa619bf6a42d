//! Internal notification and provider webhook payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::OrderStatus;

/// Body of `POST /api/orders/{id}/deposit`: a deposit observed by a trusted
/// out-of-band party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositNotification {
    pub tx_hash: String,
    pub amount: Decimal,
}

/// Result reported for a PIX payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutResult {
    #[serde(rename = "concluída")]
    Completed,
    #[serde(rename = "erro")]
    Failed,
}

/// Body of `POST /api/orders/{id}/payout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutNotification {
    pub provider_id: String,
    pub status: PayoutResult,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of the internal notification endpoints.
///
/// When the request carried an idempotency key, replays return the ack
/// stored for the first request byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAck {
    pub ok: bool,
    pub order_id: Uuid,
    pub status: OrderStatus,
}

/// Status values the PIX provider reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// An incoming PIX charge was paid (on-ramp).
    Paid,
    /// An outgoing PIX payout settled (off-ramp).
    Completed,
    /// An outgoing PIX payout failed (off-ramp).
    Failed,
}

/// Body of `POST /api/pix/webhook`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderWebhook {
    /// Provider-side transaction id; the deduplication key.
    pub id: String,
    /// Our order or buy-order id, echoed back by the provider.
    pub reference: Uuid,
    pub status: ProviderStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of the provider webhook endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
    pub applied: bool,
}
