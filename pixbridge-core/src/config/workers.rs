use super::{SUN_PER_TRX, TRON_USDT_CONTRACT};
use rust_decimal::Decimal;
use std::time::Duration;

/// Deposit watcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub token_contract: String,
    pub token_decimals: u32,
    /// Blocks on top of an event's block before it counts.
    pub confirmations: i64,
    /// How far back the very first scan starts.
    pub lookback_blocks: i64,
    pub poll_interval: Duration,
    /// Two-sided tolerance on the expected token amount.
    pub tolerance: Decimal,
    /// Payout delay for a PIX key with no completed order yet.
    pub new_payee_hold: time::Duration,
    /// Pending orders whose lock ended longer ago than this are expired in bulk.
    pub stale_after: time::Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            token_contract: TRON_USDT_CONTRACT.to_string(),
            token_decimals: 6,
            confirmations: 19,
            lookback_blocks: 2000,
            poll_interval: Duration::from_secs(10),
            tolerance: Decimal::new(2, 2),
            new_payee_hold: time::Duration::seconds(1800),
            stale_after: time::Duration::seconds(86_400),
        }
    }
}

/// Payout dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutConfig {
    /// Period of the pass over held or missed payouts.
    pub retry_interval: Duration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(15),
        }
    }
}

/// How the sweep consolidator moves funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// Real transfers through the signer.
    Live,
    /// Mark pending sweeps `sent` with a synthetic hash, no funds move.
    Stub,
}

/// Sweep consolidator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub mode: SweepMode,
    pub interval: Duration,
    pub treasury_address: String,
    pub token_contract: String,
    /// Minimum native balance (sun) a source address needs for fees.
    pub gas_reserve_sun: u64,
}

impl SweepConfig {
    pub fn gas_reserve_trx(trx: Decimal) -> u64 {
        (trx * Decimal::from(SUN_PER_TRX))
            .trunc()
            .try_into()
            .unwrap_or(0)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            mode: SweepMode::Live,
            interval: Duration::from_secs(15),
            treasury_address: String::new(),
            token_contract: TRON_USDT_CONTRACT.to_string(),
            gas_reserve_sun: 15 * SUN_PER_TRX,
        }
    }
}

/// On-ramp sender settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuySendConfig {
    /// Derivation index of the hot wallet funding on-ramp transfers.
    pub hot_derivation_index: i32,
    pub token_contract: String,
    /// Period of the pass over paid buy orders whose event was missed.
    pub retry_interval: Duration,
}

impl Default for BuySendConfig {
    fn default() -> Self {
        Self {
            hot_derivation_index: 0,
            token_contract: TRON_USDT_CONTRACT.to_string(),
            retry_interval: Duration::from_secs(15),
        }
    }
}
