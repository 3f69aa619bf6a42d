use super::{Network, OrderStatus};
use pixbridge_sdk::objects::OrderResponse;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

/// Off-ramp order: the payer deposits tokens, the payee receives PIX.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub network: Network,
    pub amount_brl: Decimal,
    pub fee_brl: Decimal,
    pub payout_brl: Decimal,
    pub crypto_amount: Decimal,
    pub address: String,
    pub derivation_index: Option<i32>,
    pub rate_locked: Decimal,
    pub rate_lock_expires_at: OffsetDateTime,
    pub pix_cpf: Option<String>,
    pub pix_phone: Option<String>,
    pub deposit_tx: Option<String>,
    pub deposit_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    /// Earliest time the payout may be dispatched (new-payee hold).
    pub payout_not_before: Option<OffsetDateTime>,
    /// Set once a dispatcher has taken ownership of the payout.
    pub payout_claimed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Outcome of checking an observed deposit against an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositVerdict {
    Accept,
    OutOfTolerance,
    Expired,
}

impl Order {
    /// Whether `amount` lies in `[expected·(1−t), expected·(1+t)]`.
    pub fn within_tolerance(&self, amount: Decimal, tolerance: Decimal) -> bool {
        let lower = self.crypto_amount * (Decimal::ONE - tolerance);
        let upper = self.crypto_amount * (Decimal::ONE + tolerance);
        amount >= lower && amount <= upper
    }

    pub fn rate_lock_expired(&self, now: OffsetDateTime) -> bool {
        now > self.rate_lock_expires_at
    }

    /// Expiry wins over the amount check: a late deposit is never applied.
    pub fn evaluate_deposit(
        &self,
        amount: Decimal,
        now: OffsetDateTime,
        tolerance: Decimal,
    ) -> DepositVerdict {
        if self.rate_lock_expired(now) {
            DepositVerdict::Expired
        } else if self.within_tolerance(amount, tolerance) {
            DepositVerdict::Accept
        } else {
            DepositVerdict::OutOfTolerance
        }
    }

    pub fn payout_due(&self, now: OffsetDateTime) -> bool {
        self.status == OrderStatus::Paid
            && self.payout_claimed_at.is_none()
            && self.payout_not_before.is_none_or(|t| t <= now)
    }

    /// The PIX key the payout is sent to; CPF takes precedence over phone.
    pub fn payee_key(&self) -> Option<&str> {
        self.pix_cpf
            .as_deref()
            .or(self.pix_phone.as_deref())
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status.into(),
            network: order.network.into(),
            amount_brl: order.amount_brl,
            fee_brl: order.fee_brl,
            payout_brl: order.payout_brl,
            crypto_amount: order.crypto_amount,
            rate: order.rate_locked,
            rate_lock_expires_at: order.rate_lock_expires_at.unix_timestamp(),
            address: order.address,
            deposit_tx: order.deposit_tx,
            deposit_amount: order.deposit_amount,
            tx_hash: order.tx_hash,
            error: order.error,
            created_at: order.created_at.unix_timestamp(),
        }
    }
}

/// Insert payload; new orders always start in `aguardando_deposito`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub network: Network,
    pub amount_brl: Decimal,
    pub fee_brl: Decimal,
    pub payout_brl: Decimal,
    pub crypto_amount: Decimal,
    pub address: String,
    pub derivation_index: Option<i32>,
    pub rate_locked: Decimal,
    pub rate_lock_expires_at: OffsetDateTime,
    pub pix_cpf: Option<String>,
    pub pix_phone: Option<String>,
    pub created_at: OffsetDateTime,
}

impl NewOrder {
    pub fn into_order(self) -> Order {
        Order {
            id: self.id,
            status: OrderStatus::AwaitingDeposit,
            network: self.network,
            amount_brl: self.amount_brl,
            fee_brl: self.fee_brl,
            payout_brl: self.payout_brl,
            crypto_amount: self.crypto_amount,
            address: self.address,
            derivation_index: self.derivation_index,
            rate_locked: self.rate_locked,
            rate_lock_expires_at: self.rate_lock_expires_at,
            pix_cpf: self.pix_cpf,
            pix_phone: self.pix_phone,
            deposit_tx: None,
            deposit_amount: None,
            tx_hash: None,
            error: None,
            payout_not_before: None,
            payout_claimed_at: None,
            created_at: self.created_at,
        }
    }
}

/// Columns written alongside a status transition. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub deposit_tx: Option<String>,
    pub deposit_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub payout_not_before: Option<OffsetDateTime>,
}

impl OrderPatch {
    pub fn deposit(tx: impl Into<String>, amount: Decimal) -> Self {
        Self {
            deposit_tx: Some(tx.into()),
            deposit_amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn settled(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: Some(tx_hash.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn hold_until(mut self, not_before: Option<OffsetDateTime>) -> Self {
        self.payout_not_before = not_before;
        self
    }

    pub fn apply(&self, order: &mut Order) {
        if let Some(tx) = &self.deposit_tx {
            order.deposit_tx = Some(tx.clone());
        }
        if let Some(amount) = self.deposit_amount {
            order.deposit_amount = Some(amount);
        }
        if let Some(hash) = &self.tx_hash {
            order.tx_hash = Some(hash.clone());
        }
        if let Some(error) = &self.error {
            order.error = Some(error.clone());
        }
        if let Some(t) = self.payout_not_before {
            order.payout_not_before = Some(t);
        }
    }

    /// Ledger payload recorded with the transition.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(tx) = &self.deposit_tx {
            map.insert("depositTx".into(), tx.clone().into());
        }
        if let Some(amount) = self.deposit_amount {
            map.insert("depositAmount".into(), amount.to_string().into());
        }
        if let Some(hash) = &self.tx_hash {
            map.insert("txHash".into(), hash.clone().into());
        }
        if let Some(error) = &self.error {
            map.insert("error".into(), error.clone().into());
        }
        if let Some(t) = self.payout_not_before {
            map.insert("payoutNotBefore".into(), t.unix_timestamp().into());
        }
        serde_json::Value::Object(map)
    }
}
