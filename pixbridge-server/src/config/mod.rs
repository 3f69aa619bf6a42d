//! Configuration module for pixbridge-server.
//!
//! Handles loading configuration from the TOML file, CLI overrides and
//! environment variables, and turns it into validated runtime settings.

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, non_blank};
use crate::config::runtime::{PixAccess, RuntimeConfig, Secrets, SignerAccess, TronAccess};
use pixbridge_core::chain::is_valid_tron_address;
use pixbridge_core::config::{
    BuySendConfig, OracleConfig, PayoutConfig, PricingConfig, SweepConfig, SweepMode,
    WatcherConfig,
};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid URL in {field}: {source}")]
    Url {
        field: &'static str,
        source: url::ParseError,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&content)?;
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        build(file_config)
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::Url { field, source })
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn validate_ranges(config: &FileConfig) -> Result<(), ConfigError> {
    let pricing = &config.pricing;
    if pricing.fee_rate < Decimal::ZERO || pricing.fee_rate >= Decimal::ONE {
        return Err(invalid("pricing.fee_rate must be in [0, 1)"));
    }
    if pricing.fee_min_brl < Decimal::ZERO {
        return Err(invalid("pricing.fee_min_brl must not be negative"));
    }
    if pricing.order_min_brl > pricing.order_max_brl {
        return Err(invalid("pricing.order_min_brl must not exceed pricing.order_max_brl"));
    }
    if config.deposits.tolerance < Decimal::ZERO || config.deposits.tolerance >= Decimal::ONE {
        return Err(invalid("deposits.tolerance must be in [0, 1)"));
    }
    if config.deposits.new_payee_hold_secs < 0 || config.deposits.stale_after_secs < 0 {
        return Err(invalid("deposits durations must not be negative"));
    }
    if config.tron.confirmations < 0 || config.tron.lookback_blocks < 0 {
        return Err(invalid("tron.confirmations and tron.lookback_blocks must not be negative"));
    }
    if config.tron.token_decimals > 18 {
        return Err(invalid("tron.token_decimals must be at most 18"));
    }
    if !is_valid_tron_address(&config.tron.usdt_contract) {
        return Err(invalid("tron.usdt_contract is not a valid TRON address"));
    }
    if let Some(treasury) = non_blank(&config.sweep.treasury_address)
        && !is_valid_tron_address(treasury)
    {
        return Err(invalid("sweep.treasury_address is not a valid TRON address"));
    }
    Ok(())
}

/// Validate a parsed file and build the runtime configuration.
///
/// In production every gap that would select a simulated path is fatal.
/// In development the same gaps log a warning.
pub fn build(config: FileConfig) -> Result<RuntimeConfig, ConfigError> {
    validate_ranges(&config)?;
    let environment = config.server.environment;
    let production = environment.is_production();

    let xpub = non_blank(&config.tron.xpub).map(str::to_string);
    if xpub.is_none() {
        if production {
            return Err(invalid("tron.xpub is required in production"));
        }
        tracing::warn!("tron.xpub not set, orders must supply their own deposit address");
    }

    let pix = match non_blank(&config.pix.token) {
        Some(token) => Some(PixAccess {
            base_url: parse_url("pix.base_url", &config.pix.base_url)?,
            token: token.to_string(),
        }),
        None if production => return Err(invalid("pix.token is required in production")),
        None => {
            tracing::warn!("pix.token not set, payouts will be simulated");
            None
        }
    };

    let signer = match (non_blank(&config.signer.url), non_blank(&config.signer.hmac_secret)) {
        (Some(url), Some(secret)) => Some(SignerAccess {
            url: parse_url("signer.url", url)?,
            hmac_secret: secret.to_string(),
            timeout: Duration::from_secs(config.signer.timeout_secs),
        }),
        (None, None) => None,
        _ => return Err(invalid("signer.url and signer.hmac_secret must be set together")),
    };
    if signer.is_none() {
        tracing::warn!("signer not configured, buy orders will wait in pago_pix");
    }

    let token_contract = config.tron.usdt_contract.clone();
    let sweep = if !config.sweep.enabled {
        None
    } else if config.sweep.stub {
        if production {
            return Err(invalid("sweep.stub is not allowed in production"));
        }
        if signer.is_some() {
            return Err(invalid("sweep.stub cannot be combined with a configured signer"));
        }
        tracing::warn!("sweep.stub enabled, sweeps are recorded without moving funds");
        Some(SweepMode::Stub)
    } else if signer.is_none() {
        if production {
            return Err(invalid("signer.url and signer.hmac_secret are required for sweeps in production"));
        }
        tracing::warn!("signer not configured, sweeps disabled");
        None
    } else {
        Some(SweepMode::Live)
    };
    let sweep = match (sweep, non_blank(&config.sweep.treasury_address)) {
        (None, _) => None,
        (Some(mode), Some(treasury)) => Some(SweepConfig {
            mode,
            interval: Duration::from_secs(config.sweep.interval_secs),
            treasury_address: treasury.to_string(),
            token_contract: token_contract.clone(),
            gas_reserve_sun: SweepConfig::gas_reserve_trx(config.tron.gas_reserve_trx),
        }),
        (Some(_), None) if production => {
            return Err(invalid("sweep.treasury_address is required in production"));
        }
        (Some(_), None) => {
            tracing::warn!("sweep.treasury_address not set, sweeps disabled");
            None
        }
    };

    let secrets = Secrets {
        notification: non_blank(&config.webhook.secret).map(str::to_string),
        provider_webhook: non_blank(&config.pix.webhook_secret).map(str::to_string),
    };
    if secrets.notification.is_none() {
        tracing::warn!("webhook.secret not set, deposit and payout notifications are disabled");
    }
    if secrets.provider_webhook.is_none() {
        tracing::warn!("pix.webhook_secret not set, provider webhooks are disabled");
    }

    Ok(RuntimeConfig {
        listen: config.server.listen,
        environment,
        pricing: PricingConfig {
            fee_rate: config.pricing.fee_rate,
            fee_min_brl: config.pricing.fee_min_brl,
            order_min_brl: config.pricing.order_min_brl,
            order_max_brl: config.pricing.order_max_brl,
            rate_lock: time::Duration::seconds(config.pricing.rate_lock_secs as i64),
            token_decimals: config.tron.token_decimals,
        },
        oracle: OracleConfig {
            ttl: Duration::from_secs(config.pricing.price_ttl_secs),
            refresh_interval: Duration::from_secs(config.pricing.price_refresh_secs.max(1)),
        },
        price_source_url: parse_url("pricing.price_source_url", &config.pricing.price_source_url)?,
        tron: TronAccess {
            full_node_url: parse_url("tron.full_node_url", &config.tron.full_node_url)?,
            api_key: non_blank(&config.tron.api_key).map(str::to_string),
            xpub,
        },
        watcher: WatcherConfig {
            token_contract: token_contract.clone(),
            token_decimals: config.tron.token_decimals,
            confirmations: config.tron.confirmations,
            lookback_blocks: config.tron.lookback_blocks,
            poll_interval: Duration::from_secs(config.tron.poll_interval_secs.max(1)),
            tolerance: config.deposits.tolerance,
            new_payee_hold: time::Duration::seconds(config.deposits.new_payee_hold_secs),
            stale_after: time::Duration::seconds(config.deposits.stale_after_secs),
        },
        payout: PayoutConfig {
            retry_interval: Duration::from_secs(config.payout.retry_interval_secs.max(1)),
        },
        pix,
        signer,
        buy_send: BuySendConfig {
            hot_derivation_index: config.signer.buy_hot_derivation_index,
            token_contract,
            retry_interval: Duration::from_secs(config.payout.retry_interval_secs.max(1)),
        },
        sweep,
        secrets,
    })
}
