use super::{BuyOrderStatus, Network};
use pixbridge_sdk::objects::BuyOrderResponse;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

/// On-ramp order: the payer sends PIX, tokens go to `dest_address`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BuyOrder {
    pub id: Uuid,
    pub status: BuyOrderStatus,
    pub network: Network,
    pub amount_brl: Decimal,
    pub fee_brl: Decimal,
    pub crypto_amount: Decimal,
    pub dest_address: String,
    pub rate_locked: Decimal,
    pub rate_lock_expires_at: OffsetDateTime,
    pub pix_cpf: Option<String>,
    pub pix_phone: Option<String>,
    pub tx_hash_out: Option<String>,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<BuyOrder> for BuyOrderResponse {
    fn from(order: BuyOrder) -> Self {
        Self {
            buy_order_id: order.id,
            status: order.status.into(),
            network: order.network.into(),
            amount_brl: order.amount_brl,
            fee_brl: order.fee_brl,
            crypto_amount: order.crypto_amount,
            rate: order.rate_locked,
            rate_lock_expires_at: order.rate_lock_expires_at.unix_timestamp(),
            dest_address: order.dest_address,
            tx_hash_out: order.tx_hash_out,
            error: order.error,
            created_at: order.created_at.unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBuyOrder {
    pub id: Uuid,
    pub network: Network,
    pub amount_brl: Decimal,
    pub fee_brl: Decimal,
    pub crypto_amount: Decimal,
    pub dest_address: String,
    pub rate_locked: Decimal,
    pub rate_lock_expires_at: OffsetDateTime,
    pub pix_cpf: Option<String>,
    pub pix_phone: Option<String>,
    pub created_at: OffsetDateTime,
}

impl NewBuyOrder {
    pub fn into_buy_order(self) -> BuyOrder {
        BuyOrder {
            id: self.id,
            status: BuyOrderStatus::AwaitingPix,
            network: self.network,
            amount_brl: self.amount_brl,
            fee_brl: self.fee_brl,
            crypto_amount: self.crypto_amount,
            dest_address: self.dest_address,
            rate_locked: self.rate_locked,
            rate_lock_expires_at: self.rate_lock_expires_at,
            pix_cpf: self.pix_cpf,
            pix_phone: self.pix_phone,
            tx_hash_out: None,
            error: None,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuyOrderPatch {
    pub tx_hash_out: Option<String>,
    pub error: Option<String>,
}

impl BuyOrderPatch {
    pub fn sent(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash_out: Some(tx_hash.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            tx_hash_out: None,
            error: Some(error.into()),
        }
    }

    pub fn apply(&self, order: &mut BuyOrder) {
        if let Some(hash) = &self.tx_hash_out {
            order.tx_hash_out = Some(hash.clone());
        }
        if let Some(error) = &self.error {
            order.error = Some(error.clone());
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(hash) = &self.tx_hash_out {
            map.insert("txHashOut".into(), hash.clone().into());
        }
        if let Some(error) = &self.error {
            map.insert("error".into(), error.clone().into());
        }
        serde_json::Value::Object(map)
    }
}
