use super::{FIRST_DERIVATION_INDEX, LedgerStore, StoreError};
use crate::entities::{
    BuyOrder, BuyOrderPatch, BuyOrderStatus, LedgerEvent, Lifecycle, Network, NewBuyOrder,
    NewLedgerEvent, NewOrder, NewSweep, Order, OrderPatch, OrderStatus, Sweep, SweepStatus,
    Transition, ledger_event,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    buy_orders: HashMap<Uuid, BuyOrder>,
    sweeps: Vec<Sweep>,
    cursors: HashMap<Network, i64>,
    events: Vec<LedgerEvent>,
}

impl Tables {
    fn push_event(&mut self, order_id: Uuid, kind: impl Into<String>, payload: serde_json::Value) {
        let id = self.events.len() as i64 + 1;
        self.events.push(LedgerEvent {
            id,
            order_id,
            kind: kind.into(),
            payload,
            created_at: OffsetDateTime::now_utc(),
        });
    }

    fn sorted_orders<F: Fn(&Order) -> bool>(&self, filter: F) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().filter(|o| filter(o)).cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }
}

/// In-process ledger behind a single `RwLock`. Each method holds the write
/// lock for its whole unit of work, which gives the same conditional-update
/// semantics as the Postgres implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All ledger entries for an order, oldest first.
    pub async fn events_for(&self, order_id: Uuid) -> Vec<LedgerEvent> {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn sweeps_for(&self, order_id: Uuid) -> Vec<Sweep> {
        self.inner
            .read()
            .await
            .sweeps
            .iter()
            .filter(|s| s.order_id == Some(order_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut t = self.inner.write().await;
        if t.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict("orders_pkey".into()));
        }
        if let Some(idx) = order.derivation_index
            && t.orders.values().any(|o| o.derivation_index == Some(idx))
        {
            return Err(StoreError::Conflict("orders_derivation_index_key".into()));
        }
        let order = order.into_order();
        let payload = serde_json::json!({
            "address": order.address,
            "cryptoAmount": order.crypto_amount.to_string(),
            "rate": order.rate_locked.to_string(),
        });
        t.push_event(order.id, ledger_event::ORDER_CREATED, payload);
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn next_derivation_index(&self) -> Result<i32, StoreError> {
        let t = self.inner.read().await;
        let next = t
            .orders
            .values()
            .filter_map(|o| o.derivation_index)
            .max()
            .map_or(FIRST_DERIVATION_INDEX, |max| max + 1);
        Ok(next.max(FIRST_DERIVATION_INDEX))
    }

    async fn pending_deposit_orders(&self, network: Network) -> Result<Vec<Order>, StoreError> {
        let t = self.inner.read().await;
        Ok(t.sorted_orders(|o| o.status == OrderStatus::AwaitingDeposit && o.network == network))
    }

    async fn expire_stale_orders(&self, cutoff: OffsetDateTime) -> Result<Vec<Uuid>, StoreError> {
        let mut t = self.inner.write().await;
        let ids: Vec<Uuid> = t
            .orders
            .values_mut()
            .filter(|o| o.status == OrderStatus::AwaitingDeposit && o.rate_lock_expires_at < cutoff)
            .map(|o| {
                o.status = OrderStatus::Expired;
                o.id
            })
            .collect();
        for id in &ids {
            t.push_event(
                *id,
                OrderStatus::Expired.event_type(),
                serde_json::json!({ "reason": "stale" }),
            );
        }
        Ok(ids)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        transition: Transition<OrderStatus>,
        patch: OrderPatch,
    ) -> Result<bool, StoreError> {
        let mut t = self.inner.write().await;
        let Some(order) = t.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != transition.from() {
            return Ok(false);
        }
        order.status = transition.to();
        patch.apply(order);
        t.push_event(id, transition.to().event_type(), patch.to_payload());
        Ok(true)
    }

    async fn claim_payout(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let mut t = self.inner.write().await;
        let Some(order) = t.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != OrderStatus::Paid || order.payout_claimed_at.is_some() {
            return Ok(false);
        }
        order.payout_claimed_at = Some(now);
        t.push_event(
            id,
            "order.payout_claimed",
            serde_json::json!({ "claimedAt": now.unix_timestamp() }),
        );
        Ok(true)
    }

    async fn orders_due_for_payout(&self, now: OffsetDateTime) -> Result<Vec<Order>, StoreError> {
        let t = self.inner.read().await;
        Ok(t.sorted_orders(|o| o.payout_due(now)))
    }

    async fn payee_has_completed_order(
        &self,
        pix_cpf: Option<&str>,
        pix_phone: Option<&str>,
    ) -> Result<bool, StoreError> {
        let t = self.inner.read().await;
        Ok(t.orders.values().any(|o| {
            o.status == OrderStatus::Completed
                && ((pix_cpf.is_some() && o.pix_cpf.as_deref() == pix_cpf)
                    || (pix_phone.is_some() && o.pix_phone.as_deref() == pix_phone))
        }))
    }

    async fn insert_buy_order(&self, order: NewBuyOrder) -> Result<BuyOrder, StoreError> {
        let mut t = self.inner.write().await;
        if t.buy_orders.contains_key(&order.id) {
            return Err(StoreError::Conflict("buy_orders_pkey".into()));
        }
        let order = order.into_buy_order();
        let payload = serde_json::json!({
            "destAddress": order.dest_address,
            "cryptoAmount": order.crypto_amount.to_string(),
        });
        t.push_event(order.id, ledger_event::BUY_CREATED, payload);
        t.buy_orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_buy_order(&self, id: Uuid) -> Result<Option<BuyOrder>, StoreError> {
        Ok(self.inner.read().await.buy_orders.get(&id).cloned())
    }

    async fn buy_orders_awaiting_send(&self) -> Result<Vec<BuyOrder>, StoreError> {
        let t = self.inner.read().await;
        let mut orders: Vec<BuyOrder> = t
            .buy_orders
            .values()
            .filter(|o| o.status == BuyOrderStatus::PixReceived)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn transition_buy_order(
        &self,
        id: Uuid,
        transition: Transition<BuyOrderStatus>,
        patch: BuyOrderPatch,
    ) -> Result<bool, StoreError> {
        let mut t = self.inner.write().await;
        let Some(order) = t.buy_orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != transition.from() {
            return Ok(false);
        }
        order.status = transition.to();
        patch.apply(order);
        t.push_event(id, transition.to().event_type(), patch.to_payload());
        Ok(true)
    }

    async fn orders_to_sweep(&self) -> Result<Vec<Order>, StoreError> {
        let t = self.inner.read().await;
        Ok(t.sorted_orders(|o| {
            matches!(o.status, OrderStatus::Paid | OrderStatus::Completed)
                && o.derivation_index.is_some()
                && o.deposit_amount.is_some()
                && !t.sweeps.iter().any(|s| s.order_id == Some(o.id))
        }))
    }

    async fn create_sweep(&self, sweep: NewSweep) -> Result<Option<Sweep>, StoreError> {
        let mut t = self.inner.write().await;
        if t.sweeps.iter().any(|s| s.order_id == Some(sweep.order_id)) {
            return Ok(None);
        }
        let order_id = sweep.order_id;
        let created = sweep.into_sweep(Uuid::new_v4(), OffsetDateTime::now_utc());
        let payload = serde_json::json!({
            "sweepId": created.id.to_string(),
            "amount": created.amount.to_string(),
            "fromAddr": created.from_addr,
        });
        t.push_event(order_id, SweepStatus::Pending.event_type(), payload);
        t.sweeps.push(created.clone());
        Ok(Some(created))
    }

    async fn pending_sweeps(&self) -> Result<Vec<Sweep>, StoreError> {
        let t = self.inner.read().await;
        Ok(t.sweeps
            .iter()
            .filter(|s| s.status == SweepStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_sweep(
        &self,
        id: Uuid,
        transition: Transition<SweepStatus>,
        tx_hash: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut t = self.inner.write().await;
        let Some(sweep) = t.sweeps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if sweep.status != transition.from() {
            return Ok(false);
        }
        sweep.status = transition.to();
        sweep.updated_at = OffsetDateTime::now_utc();
        if tx_hash.is_some() {
            sweep.tx_hash = tx_hash.clone();
        }
        if let Some(order_id) = sweep.order_id {
            let payload = serde_json::json!({ "sweepId": id.to_string(), "txHash": tx_hash });
            t.push_event(order_id, transition.to().event_type(), payload);
        }
        Ok(true)
    }

    async fn get_cursor(&self, network: Network) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.read().await.cursors.get(&network).copied())
    }

    async fn save_cursor(&self, network: Network, last_block: i64) -> Result<(), StoreError> {
        let mut t = self.inner.write().await;
        let cursor = t.cursors.entry(network).or_insert(last_block);
        *cursor = (*cursor).max(last_block);
        Ok(())
    }

    async fn append_event(&self, event: NewLedgerEvent) -> Result<(), StoreError> {
        let mut t = self.inner.write().await;
        t.push_event(event.order_id, event.kind, event.payload);
        Ok(())
    }

    async fn find_event(
        &self,
        order_id: Uuid,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<LedgerEvent>, StoreError> {
        let t = self.inner.read().await;
        Ok(t.events
            .iter()
            .find(|e| e.order_id == order_id && e.kind == kind && e.field_is(field, value))
            .cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order(index: Option<i32>) -> NewOrder {
        let now = OffsetDateTime::now_utc();
        NewOrder {
            id: Uuid::new_v4(),
            network: Network::Tron,
            amount_brl: dec!(100),
            fee_brl: dec!(10),
            payout_brl: dec!(90),
            crypto_amount: dec!(18),
            address: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into(),
            derivation_index: index,
            rate_locked: dec!(5),
            rate_lock_expires_at: now + time::Duration::minutes(10),
            pix_cpf: Some("12345678901".into()),
            pix_phone: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn conditional_transition_succeeds_once() {
        let ledger = MemoryLedger::new();
        let order = ledger.insert_order(new_order(None)).await.unwrap();
        let t = Transition::new(OrderStatus::AwaitingDeposit, OrderStatus::Paid).unwrap();

        assert!(ledger
            .transition_order(order.id, t, OrderPatch::deposit("tx1", dec!(18)))
            .await
            .unwrap());
        assert!(!ledger
            .transition_order(order.id, t, OrderPatch::deposit("tx1", dec!(18)))
            .await
            .unwrap());

        let events = ledger.events_for(order.id).await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["order.created", "order.pago"]);
        assert!(ledger
            .has_event(order.id, "order.pago", "depositTx", "tx1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn derivation_indexes_are_unique() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.next_derivation_index().await.unwrap(), FIRST_DERIVATION_INDEX);
        ledger.insert_order(new_order(Some(1))).await.unwrap();
        assert_eq!(ledger.next_derivation_index().await.unwrap(), 2);
        assert!(matches!(
            ledger.insert_order(new_order(Some(1))).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.get_cursor(Network::Tron).await.unwrap(), None);
        ledger.save_cursor(Network::Tron, 100).await.unwrap();
        ledger.save_cursor(Network::Tron, 90).await.unwrap();
        assert_eq!(ledger.get_cursor(Network::Tron).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn payout_claim_is_exclusive() {
        let ledger = MemoryLedger::new();
        let order = ledger.insert_order(new_order(None)).await.unwrap();
        let now = OffsetDateTime::now_utc();
        assert!(!ledger.claim_payout(order.id, now).await.unwrap());

        let t = Transition::new(OrderStatus::AwaitingDeposit, OrderStatus::Paid).unwrap();
        ledger
            .transition_order(order.id, t, OrderPatch::deposit("tx1", dec!(18)))
            .await
            .unwrap();
        assert_eq!(ledger.orders_due_for_payout(now).await.unwrap().len(), 1);
        assert!(ledger.claim_payout(order.id, now).await.unwrap());
        assert!(!ledger.claim_payout(order.id, now).await.unwrap());
        assert!(ledger.orders_due_for_payout(now).await.unwrap().is_empty());
    }
}
