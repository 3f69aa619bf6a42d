//! Read access to the settlement chain.

pub mod address;
pub mod trongrid;

pub use address::{AddressAllocator, AllocatorError, is_valid_tron_address};
pub use trongrid::TronGridClient;

use crate::entities::Network;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while reading the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("API request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API response parsing error: {0}")]
    Parse(String),

    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error: {message}")]
    Api { message: String },
}

/// One confirmed token `Transfer` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub tx_id: String,
    pub block_number: i64,
    /// Destination, already normalized to base58.
    pub to: String,
    /// Integer amount in the token's smallest unit.
    pub raw_value: String,
}

impl TransferEvent {
    /// Scale the raw integer amount by `decimals`.
    pub fn amount(&self, decimals: u32) -> Result<Decimal, ChainError> {
        let raw: i128 = self
            .raw_value
            .parse()
            .map_err(|e| ChainError::Parse(format!("invalid transfer value {}: {e}", self.raw_value)))?;
        Decimal::try_from_i128_with_scale(raw, decimals)
            .map(|d| d.normalize())
            .map_err(|e| ChainError::Parse(format!("transfer value out of range: {e}")))
    }
}

/// One page of transfer events plus the opaque cursor for the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPage {
    pub events: Vec<TransferEvent>,
    pub next: Option<String>,
}

/// Chain access needed by the deposit watcher and sweep consolidator.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn network(&self) -> Network;

    /// Current chain head height.
    async fn latest_block(&self) -> Result<i64, ChainError>;

    /// Confirmed `Transfer` events of `contract` in `block`, one page at a time.
    async fn transfer_events(
        &self,
        contract: &str,
        block: i64,
        page: Option<&str>,
    ) -> Result<TransferPage, ChainError>;

    /// Native balance (TRX in sun) available for fees.
    async fn native_balance(&self, address: &str) -> Result<u64, ChainError>;
}
