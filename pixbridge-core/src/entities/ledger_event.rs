use time::OffsetDateTime;
use uuid::Uuid;

/// Ledger entry type for stored idempotent responses.
pub const IDEMPOTENCY: &str = "idempotency";
/// Ledger entry type for accepted PIX provider webhooks.
pub const PROVIDER_WEBHOOK: &str = "webhook.provider";
pub const ORDER_CREATED: &str = "order.created";
pub const BUY_CREATED: &str = "buy.created";

/// An append-only ledger entry. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LedgerEvent {
    pub id: i64,
    pub order_id: Uuid,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEvent {
    pub order_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
}

impl NewLedgerEvent {
    pub fn new(order_id: Uuid, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            order_id,
            kind: kind.into(),
            payload,
        }
    }
}

impl LedgerEvent {
    /// Whether the payload's `field` equals `value` as a JSON string.
    pub fn field_is(&self, field: &str, value: &str) -> bool {
        self.payload.get(field).and_then(|v| v.as_str()) == Some(value)
    }
}
