//! Status and network enums for API responses.
//!
//! These are the API/DTO versions without sqlx::Type.
//! For database operations, use the versions in `pixbridge-core::entities`.

use serde::{Deserialize, Serialize};

/// Supported settlement networks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    #[default]
    #[serde(rename = "TRON", alias = "tron", alias = "TRC20")]
    Tron,
}

/// Off-ramp (crypto -> PIX) order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "aguardando_deposito")]
    AwaitingDeposit,
    #[serde(rename = "pago")]
    Paid,
    #[serde(rename = "concluída")]
    Completed,
    #[serde(rename = "erro")]
    Failed,
    #[serde(rename = "aguardando_validacao")]
    AwaitingReview,
    #[serde(rename = "expirada")]
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::AwaitingDeposit | OrderStatus::Paid)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::AwaitingDeposit => write!(f, "aguardando_deposito"),
            OrderStatus::Paid => write!(f, "pago"),
            OrderStatus::Completed => write!(f, "concluída"),
            OrderStatus::Failed => write!(f, "erro"),
            OrderStatus::AwaitingReview => write!(f, "aguardando_validacao"),
            OrderStatus::Expired => write!(f, "expirada"),
        }
    }
}

/// On-ramp (PIX -> crypto) buy order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuyOrderStatus {
    #[serde(rename = "aguardando_pix")]
    AwaitingPix,
    #[serde(rename = "pago_pix")]
    PixReceived,
    #[serde(rename = "enviado_onchain")]
    SentOnchain,
    #[serde(rename = "concluída")]
    Completed,
    #[serde(rename = "erro")]
    Failed,
}

impl std::fmt::Display for BuyOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuyOrderStatus::AwaitingPix => write!(f, "aguardando_pix"),
            BuyOrderStatus::PixReceived => write!(f, "pago_pix"),
            BuyOrderStatus::SentOnchain => write!(f, "enviado_onchain"),
            BuyOrderStatus::Completed => write!(f, "concluída"),
            BuyOrderStatus::Failed => write!(f, "erro"),
        }
    }
}
