//! Order and buy-order request/response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{BuyOrderStatus, Network, OrderStatus};

/// Request body for creating an off-ramp (crypto -> PIX) order.
///
/// `address` is optional: when omitted the server derives a dedicated
/// deposit address for the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(rename = "amountBRL")]
    pub amount_brl: Decimal,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub pix_cpf: Option<String>,
    #[serde(default)]
    pub pix_phone: Option<String>,
}

/// Off-ramp order as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub network: Network,
    #[serde(rename = "amountBRL")]
    pub amount_brl: Decimal,
    #[serde(rename = "feeBRL")]
    pub fee_brl: Decimal,
    #[serde(rename = "payoutBRL")]
    pub payout_brl: Decimal,
    pub crypto_amount: Decimal,
    pub rate: Decimal,
    /// Unix timestamp after which the locked rate is no longer honoured.
    pub rate_lock_expires_at: i64,
    pub address: String,
    pub deposit_tx: Option<String>,
    pub deposit_amount: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
}

/// Request body for creating an on-ramp (PIX -> crypto) buy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBuyOrderRequest {
    #[serde(rename = "amountBRL")]
    pub amount_brl: Decimal,
    pub dest_address: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub pix_cpf: Option<String>,
    #[serde(default)]
    pub pix_phone: Option<String>,
}

/// On-ramp buy order as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyOrderResponse {
    pub buy_order_id: Uuid,
    pub status: BuyOrderStatus,
    pub network: Network,
    #[serde(rename = "amountBRL")]
    pub amount_brl: Decimal,
    #[serde(rename = "feeBRL")]
    pub fee_brl: Decimal,
    pub crypto_amount: Decimal,
    pub rate: Decimal,
    pub rate_lock_expires_at: i64,
    pub dest_address: String,
    pub tx_hash_out: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
}

/// Current USDT/BRL rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub brl: Decimal,
}

/// One frame of the per-order server-push status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    pub status: OrderStatus,
    pub tx_hash: Option<String>,
}
