//! Runtime configuration types for the settlement engine.
//!
//! These are the validated values the processors run with. Loading and
//! validating the TOML file is handled by the server crate.

mod pricing;
mod workers;

pub use pricing::{OracleConfig, PricingConfig};
pub use workers::{BuySendConfig, PayoutConfig, SweepConfig, SweepMode, WatcherConfig};

/// Deployment environment. Production never falls back to simulated
/// settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Sun per TRX.
pub const SUN_PER_TRX: u64 = 1_000_000;

/// Mainnet USDT (TRC-20) contract.
pub const TRON_USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
