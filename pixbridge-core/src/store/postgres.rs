use super::{FIRST_DERIVATION_INDEX, LedgerStore, StoreError};
use crate::entities::{
    BuyOrder, BuyOrderPatch, BuyOrderStatus, LedgerEvent, Lifecycle, Network, NewBuyOrder,
    NewLedgerEvent, NewOrder, NewSweep, Order, OrderPatch, OrderStatus, Sweep, SweepStatus,
    Transition, ledger_event,
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL-backed ledger. Status writes and their ledger entries share
/// one transaction.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_event(
    conn: &mut PgConnection,
    order_id: Uuid,
    kind: &str,
    payload: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_events (order_id, type, payload)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(order_id)
    .bind(kind)
    .bind(payload)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedger {
    #[tracing::instrument(skip_all, err, name = "SQL:InsertOrder")]
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                id, network, amount_brl, fee_brl, payout_brl, crypto_amount, address,
                derivation_index, rate_locked, rate_lock_expires_at, pix_cpf, pix_phone, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(order.network)
        .bind(order.amount_brl)
        .bind(order.fee_brl)
        .bind(order.payout_brl)
        .bind(order.crypto_amount)
        .bind(&order.address)
        .bind(order.derivation_index)
        .bind(order.rate_locked)
        .bind(order.rate_lock_expires_at)
        .bind(&order.pix_cpf)
        .bind(&order.pix_phone)
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let payload = serde_json::json!({
            "address": inserted.address,
            "cryptoAmount": inserted.crypto_amount.to_string(),
            "rate": inserted.rate_locked.to_string(),
        });
        insert_event(&mut tx, inserted.id, ledger_event::ORDER_CREATED, &payload).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetOrder")]
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:NextDerivationIndex")]
    async fn next_derivation_index(&self) -> Result<i32, StoreError> {
        let next = sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(derivation_index) + 1, $1) FROM orders",
        )
        .bind(FIRST_DERIVATION_INDEX)
        .fetch_one(&self.pool)
        .await?;
        Ok(next.max(FIRST_DERIVATION_INDEX))
    }

    #[tracing::instrument(skip_all, err, name = "SQL:PendingDepositOrders")]
    async fn pending_deposit_orders(&self, network: Network) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE status = 'aguardando_deposito' AND network = $1
            ORDER BY created_at
            "#,
        )
        .bind(network)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ExpireStaleOrders")]
    async fn expire_stale_orders(&self, cutoff: OffsetDateTime) -> Result<Vec<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE orders
            SET status = 'expirada', updated_at = now()
            WHERE status = 'aguardando_deposito' AND rate_lock_expires_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        if !ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO order_events (order_id, type, payload)
                SELECT id, $2, $3 FROM unnest($1::uuid[]) AS id
                "#,
            )
            .bind(&ids)
            .bind(OrderStatus::Expired.event_type())
            .bind(serde_json::json!({ "reason": "stale" }))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(ids)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:TransitionOrder", fields(order_id = %id))]
    async fn transition_order(
        &self,
        id: Uuid,
        transition: Transition<OrderStatus>,
        patch: OrderPatch,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3,
                deposit_tx = COALESCE($4, deposit_tx),
                deposit_amount = COALESCE($5, deposit_amount),
                tx_hash = COALESCE($6, tx_hash),
                error = COALESCE($7, error),
                payout_not_before = COALESCE($8, payout_not_before),
                updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(transition.from())
        .bind(transition.to())
        .bind(&patch.deposit_tx)
        .bind(patch.deposit_amount)
        .bind(&patch.tx_hash)
        .bind(&patch.error)
        .bind(patch.payout_not_before)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_event(
            &mut tx,
            id,
            &transition.to().event_type(),
            &patch.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ClaimPayout", fields(order_id = %id))]
    async fn claim_payout(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payout_claimed_at = $2, updated_at = now()
            WHERE id = $1 AND status = 'pago' AND payout_claimed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_event(
            &mut tx,
            id,
            "order.payout_claimed",
            &serde_json::json!({ "claimedAt": now.unix_timestamp() }),
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:OrdersDueForPayout")]
    async fn orders_due_for_payout(&self, now: OffsetDateTime) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE status = 'pago'
              AND payout_claimed_at IS NULL
              AND (payout_not_before IS NULL OR payout_not_before <= $1)
            ORDER BY created_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:PayeeHasCompletedOrder")]
    async fn payee_has_completed_order(
        &self,
        pix_cpf: Option<&str>,
        pix_phone: Option<&str>,
    ) -> Result<bool, StoreError> {
        if pix_cpf.is_none() && pix_phone.is_none() {
            return Ok(false);
        }
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE status = 'concluída'
                  AND (pix_cpf = $1 OR pix_phone = $2)
            )
            "#,
        )
        .bind(pix_cpf)
        .bind(pix_phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:InsertBuyOrder")]
    async fn insert_buy_order(&self, order: NewBuyOrder) -> Result<BuyOrder, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query_as::<_, BuyOrder>(
            r#"
            INSERT INTO buy_orders (
                id, network, amount_brl, fee_brl, crypto_amount, dest_address,
                rate_locked, rate_lock_expires_at, pix_cpf, pix_phone, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(order.network)
        .bind(order.amount_brl)
        .bind(order.fee_brl)
        .bind(order.crypto_amount)
        .bind(&order.dest_address)
        .bind(order.rate_locked)
        .bind(order.rate_lock_expires_at)
        .bind(&order.pix_cpf)
        .bind(&order.pix_phone)
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let payload = serde_json::json!({
            "destAddress": inserted.dest_address,
            "cryptoAmount": inserted.crypto_amount.to_string(),
        });
        insert_event(&mut tx, inserted.id, ledger_event::BUY_CREATED, &payload).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetBuyOrder")]
    async fn get_buy_order(&self, id: Uuid) -> Result<Option<BuyOrder>, StoreError> {
        let order = sqlx::query_as::<_, BuyOrder>("SELECT * FROM buy_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:BuyOrdersAwaitingSend")]
    async fn buy_orders_awaiting_send(&self) -> Result<Vec<BuyOrder>, StoreError> {
        let orders = sqlx::query_as::<_, BuyOrder>(
            "SELECT * FROM buy_orders WHERE status = 'pago_pix' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:TransitionBuyOrder", fields(buy_order_id = %id))]
    async fn transition_buy_order(
        &self,
        id: Uuid,
        transition: Transition<BuyOrderStatus>,
        patch: BuyOrderPatch,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE buy_orders
            SET status = $3,
                tx_hash_out = COALESCE($4, tx_hash_out),
                error = COALESCE($5, error),
                updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(transition.from())
        .bind(transition.to())
        .bind(&patch.tx_hash_out)
        .bind(&patch.error)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_event(
            &mut tx,
            id,
            &transition.to().event_type(),
            &patch.to_payload(),
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:OrdersToSweep")]
    async fn orders_to_sweep(&self) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT o.* FROM orders o
            WHERE o.status IN ('pago', 'concluída')
              AND o.derivation_index IS NOT NULL
              AND o.deposit_amount IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM sweeps s WHERE s.order_id = o.id)
            ORDER BY o.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CreateSweep")]
    async fn create_sweep(&self, sweep: NewSweep) -> Result<Option<Sweep>, StoreError> {
        let mut tx = self.pool.begin().await?;
        // The partial unique index rejects a second live sweep even when two
        // cycles race past the NOT EXISTS check.
        let created = sqlx::query_as::<_, Sweep>(
            r#"
            INSERT INTO sweeps (id, child_index, from_addr, to_addr, amount, order_id)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (SELECT 1 FROM sweeps WHERE order_id = $6)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sweep.child_index)
        .bind(&sweep.from_addr)
        .bind(&sweep.to_addr)
        .bind(sweep.amount)
        .bind(sweep.order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created) = created else {
            tx.rollback().await?;
            return Ok(None);
        };
        let payload = serde_json::json!({
            "sweepId": created.id.to_string(),
            "amount": created.amount.to_string(),
            "fromAddr": created.from_addr,
        });
        insert_event(&mut tx, sweep.order_id, &SweepStatus::Pending.event_type(), &payload).await?;
        tx.commit().await?;
        Ok(Some(created))
    }

    #[tracing::instrument(skip_all, err, name = "SQL:PendingSweeps")]
    async fn pending_sweeps(&self) -> Result<Vec<Sweep>, StoreError> {
        let sweeps = sqlx::query_as::<_, Sweep>(
            "SELECT * FROM sweeps WHERE status = 'pending' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sweeps)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:MarkSweep", fields(sweep_id = %id))]
    async fn mark_sweep(
        &self,
        id: Uuid,
        transition: Transition<SweepStatus>,
        tx_hash: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_scalar::<_, Option<Uuid>>(
            r#"
            UPDATE sweeps
            SET status = $3, tx_hash = COALESCE($4, tx_hash), updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING order_id
            "#,
        )
        .bind(id)
        .bind(transition.from())
        .bind(transition.to())
        .bind(&tx_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = updated else {
            tx.rollback().await?;
            return Ok(false);
        };
        if let Some(order_id) = order_id {
            let payload = serde_json::json!({ "sweepId": id.to_string(), "txHash": tx_hash });
            insert_event(&mut tx, order_id, &transition.to().event_type(), &payload).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetCursor")]
    async fn get_cursor(&self, network: Network) -> Result<Option<i64>, StoreError> {
        let cursor = sqlx::query_scalar::<_, i64>(
            "SELECT last_block FROM scan_cursors WHERE network = $1",
        )
        .bind(network)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cursor)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:SaveCursor")]
    async fn save_cursor(&self, network: Network, last_block: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scan_cursors (network, last_block)
            VALUES ($1, $2)
            ON CONFLICT (network) DO UPDATE
            SET last_block = GREATEST(scan_cursors.last_block, EXCLUDED.last_block),
                updated_at = now()
            "#,
        )
        .bind(network)
        .bind(last_block)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:AppendEvent")]
    async fn append_event(&self, event: NewLedgerEvent) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_event(&mut conn, event.order_id, &event.kind, &event.payload).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:FindEvent")]
    async fn find_event(
        &self,
        order_id: Uuid,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<LedgerEvent>, StoreError> {
        let event = sqlx::query_as::<_, LedgerEvent>(
            r#"
            SELECT * FROM order_events
            WHERE order_id = $1 AND type = $2 AND payload ->> $3 = $4
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .bind(kind)
        .bind(field)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
