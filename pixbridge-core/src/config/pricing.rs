use rust_decimal::Decimal;

/// Fee schedule, order bounds and rate-lock window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    pub fee_rate: Decimal,
    pub fee_min_brl: Decimal,
    pub order_min_brl: Decimal,
    pub order_max_brl: Decimal,
    pub rate_lock: time::Duration,
    /// Decimal places of the settlement token.
    pub token_decimals: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(2, 2),
            fee_min_brl: Decimal::from(10),
            order_min_brl: Decimal::from(10),
            order_max_brl: Decimal::from(100_000),
            rate_lock: time::Duration::seconds(600),
            token_decimals: 6,
        }
    }
}

/// Rate oracle cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// How long a fetched rate is served from cache.
    pub ttl: std::time::Duration,
    /// Background refresh period.
    pub refresh_interval: std::time::Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            ttl: std::time::Duration::from_secs(60),
            refresh_interval: std::time::Duration::from_secs(30),
        }
    }
}
