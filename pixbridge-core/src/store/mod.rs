//! The Ledger Store: durable orders, buy orders, sweeps, scan cursors and
//! the append-only event ledger.
//!
//! Every status change goes through a conditional update keyed on the
//! expected predecessor status. A `false` return means another writer got
//! there first and is not an error.

mod memory;
mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use crate::entities::{
    BuyOrder, BuyOrderPatch, BuyOrderStatus, LedgerEvent, Network, NewBuyOrder, NewLedgerEvent,
    NewOrder, NewSweep, Order, OrderPatch, OrderStatus, Sweep, SweepStatus, Transition,
};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// First index handed out to per-order deposit addresses. Index 0 is left
/// to the on-ramp hot wallet.
pub const FIRST_DERIVATION_INDEX: i32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && db.is_unique_violation()
        {
            return StoreError::Conflict(db.constraint().unwrap_or("unknown").to_string());
        }
        StoreError::Database(e)
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -- orders --------------------------------------------------------------

    /// Persist a new order and its `order.created` entry. A duplicate
    /// derivation index is reported as [`StoreError::Conflict`].
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// `max(derivation_index) + 1`, or [`FIRST_DERIVATION_INDEX`] when none exist.
    async fn next_derivation_index(&self) -> Result<i32, StoreError>;

    async fn pending_deposit_orders(&self, network: Network) -> Result<Vec<Order>, StoreError>;

    /// Move every `aguardando_deposito` order whose rate lock ended before
    /// `cutoff` to `expirada`. Returns the expired ids.
    async fn expire_stale_orders(&self, cutoff: OffsetDateTime) -> Result<Vec<Uuid>, StoreError>;

    /// Conditional status update; appends `order.{to}` with the patch as payload.
    async fn transition_order(
        &self,
        id: Uuid,
        transition: Transition<OrderStatus>,
        patch: OrderPatch,
    ) -> Result<bool, StoreError>;

    /// Take ownership of a `pago` order's payout. Only one caller ever wins.
    async fn claim_payout(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError>;

    /// Unclaimed `pago` orders whose hold (if any) has elapsed.
    async fn orders_due_for_payout(&self, now: OffsetDateTime) -> Result<Vec<Order>, StoreError>;

    async fn payee_has_completed_order(
        &self,
        pix_cpf: Option<&str>,
        pix_phone: Option<&str>,
    ) -> Result<bool, StoreError>;

    // -- buy orders ----------------------------------------------------------

    async fn insert_buy_order(&self, order: NewBuyOrder) -> Result<BuyOrder, StoreError>;

    async fn get_buy_order(&self, id: Uuid) -> Result<Option<BuyOrder>, StoreError>;

    /// Buy orders in `pago_pix`, oldest first.
    async fn buy_orders_awaiting_send(&self) -> Result<Vec<BuyOrder>, StoreError>;

    async fn transition_buy_order(
        &self,
        id: Uuid,
        transition: Transition<BuyOrderStatus>,
        patch: BuyOrderPatch,
    ) -> Result<bool, StoreError>;

    // -- sweeps --------------------------------------------------------------

    /// Orders holding funds at a derived address and never swept before.
    async fn orders_to_sweep(&self) -> Result<Vec<Order>, StoreError>;

    /// Create a `pending` sweep, or `None` when the order already has one.
    async fn create_sweep(&self, sweep: NewSweep) -> Result<Option<Sweep>, StoreError>;

    async fn pending_sweeps(&self) -> Result<Vec<Sweep>, StoreError>;

    async fn mark_sweep(
        &self,
        id: Uuid,
        transition: Transition<SweepStatus>,
        tx_hash: Option<String>,
    ) -> Result<bool, StoreError>;

    // -- cursors -------------------------------------------------------------

    async fn get_cursor(&self, network: Network) -> Result<Option<i64>, StoreError>;

    /// Never moves a cursor backwards.
    async fn save_cursor(&self, network: Network, last_block: i64) -> Result<(), StoreError>;

    // -- ledger --------------------------------------------------------------

    async fn append_event(&self, event: NewLedgerEvent) -> Result<(), StoreError>;

    /// The first entry of `kind` on `order_id` whose payload `field` equals `value`.
    async fn find_event(
        &self,
        order_id: Uuid,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<LedgerEvent>, StoreError>;

    async fn has_event(
        &self,
        order_id: Uuid,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.find_event(order_id, kind, field, value).await?.is_some())
    }

    /// Round-trip used by readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}
