use super::SweepStatus;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

/// Consolidating transfer from an order's deposit address to the treasury.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Sweep {
    pub id: Uuid,
    pub child_index: i32,
    pub from_addr: String,
    pub to_addr: String,
    pub amount: Decimal,
    pub status: SweepStatus,
    pub tx_hash: Option<String>,
    pub order_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSweep {
    pub child_index: i32,
    pub from_addr: String,
    pub to_addr: String,
    pub amount: Decimal,
    pub order_id: Uuid,
}

impl NewSweep {
    pub fn into_sweep(self, id: Uuid, now: OffsetDateTime) -> Sweep {
        Sweep {
            id,
            child_index: self.child_index,
            from_addr: self.from_addr,
            to_addr: self.to_addr,
            amount: self.amount,
            status: SweepStatus::Pending,
            tx_hash: None,
            order_id: Some(self.order_id),
            created_at: now,
            updated_at: now,
        }
    }
}
