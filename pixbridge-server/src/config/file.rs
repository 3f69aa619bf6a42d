//! TOML file configuration structures.
//!
//! These structs map directly to the `pixbridge.toml` file format. Every
//! section and key is optional and falls back to its default.

use pixbridge_core::clients::price::COINGECKO_USDT_BRL;
use pixbridge_core::config::{Environment, TRON_USDT_CONTRACT};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub pricing: PricingSection,
    pub tron: TronSection,
    pub deposits: DepositsSection,
    pub payout: PayoutSection,
    pub pix: PixSection,
    pub signer: SignerSection,
    pub sweep: SweepSection,
    pub webhook: WebhookSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: SocketAddr,
    pub environment: Environment,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3000)),
            environment: Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingSection {
    pub fee_rate: Decimal,
    pub fee_min_brl: Decimal,
    pub order_min_brl: Decimal,
    pub order_max_brl: Decimal,
    pub rate_lock_secs: u64,
    pub price_ttl_secs: u64,
    pub price_refresh_secs: u64,
    pub price_source_url: String,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(2, 2),
            fee_min_brl: Decimal::from(10),
            order_min_brl: Decimal::from(10),
            order_max_brl: Decimal::from(100_000),
            rate_lock_secs: 600,
            price_ttl_secs: 60,
            price_refresh_secs: 30,
            price_source_url: COINGECKO_USDT_BRL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TronSection {
    pub full_node_url: String,
    pub api_key: Option<String>,
    pub usdt_contract: String,
    pub token_decimals: u32,
    pub confirmations: i64,
    pub lookback_blocks: i64,
    pub poll_interval_secs: u64,
    /// Extended public key deposit addresses are derived from.
    pub xpub: Option<String>,
    pub gas_reserve_trx: Decimal,
}

impl Default for TronSection {
    fn default() -> Self {
        Self {
            full_node_url: "https://api.trongrid.io".to_string(),
            api_key: None,
            usdt_contract: TRON_USDT_CONTRACT.to_string(),
            token_decimals: 6,
            confirmations: 19,
            lookback_blocks: 2000,
            poll_interval_secs: 10,
            xpub: None,
            gas_reserve_trx: Decimal::from(15),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepositsSection {
    pub tolerance: Decimal,
    pub new_payee_hold_secs: i64,
    pub stale_after_secs: i64,
}

impl Default for DepositsSection {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(2, 2),
            new_payee_hold_secs: 1800,
            stale_after_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PayoutSection {
    pub retry_interval_secs: u64,
}

impl Default for PayoutSection {
    fn default() -> Self {
        Self {
            retry_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PixSection {
    pub base_url: String,
    pub token: Option<String>,
    /// Secret of the provider's `x-pagbank-signature` webhook HMAC.
    pub webhook_secret: Option<String>,
}

impl Default for PixSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.pagseguro.com".to_string(),
            token: None,
            webhook_secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignerSection {
    pub url: Option<String>,
    pub hmac_secret: Option<String>,
    pub buy_hot_derivation_index: i32,
    pub timeout_secs: u64,
}

impl Default for SignerSection {
    fn default() -> Self {
        Self {
            url: None,
            hmac_secret: None,
            buy_hot_derivation_index: 0,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub enabled: bool,
    pub stub: bool,
    pub interval_secs: u64,
    pub treasury_address: Option<String>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            enabled: true,
            stub: false,
            interval_secs: 15,
            treasury_address: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookSection {
    /// Secret of the `x-signature` HMAC on internal notifications.
    pub secret: Option<String>,
}

/// Treat blank strings as unset.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_file_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.pricing.fee_rate, dec!(0.02));
        assert_eq!(config.tron.confirmations, 19);
        assert_eq!(config.tron.usdt_contract, TRON_USDT_CONTRACT);
        assert!(config.sweep.enabled);
        assert!(!config.sweep.stub);
        assert_eq!(config.signer.timeout_secs, 20);
    }

    #[test]
    fn parses_full_file() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:8080"
environment = "production"

[pricing]
fee_rate = 0.015
fee_min_brl = 5
rate_lock_secs = 300

[tron]
api_key = "key"
xpub = "xpub-test"
gas_reserve_trx = 20.5

[deposits]
tolerance = 0.01
new_payee_hold_secs = 0

[pix]
token = "pix-token"
webhook_secret = "pix-secret"

[signer]
url = "https://signer.internal"
hmac_secret = "signer-secret"
buy_hot_derivation_index = 3

[sweep]
interval_secs = 30
treasury_address = "TRvS7Mk41ndmYWHQTAs4GLj3JwLHTwhSV4"

[webhook]
secret = "notify-secret"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.environment, Environment::Production);
        assert_eq!(config.pricing.fee_rate, dec!(0.015));
        assert_eq!(config.pricing.fee_min_brl, dec!(5));
        assert_eq!(config.pricing.order_max_brl, dec!(100000));
        assert_eq!(config.tron.gas_reserve_trx, dec!(20.5));
        assert_eq!(config.deposits.tolerance, dec!(0.01));
        assert_eq!(config.deposits.new_payee_hold_secs, 0);
        assert_eq!(config.signer.buy_hot_derivation_index, 3);
        assert_eq!(non_blank(&config.webhook.secret), Some("notify-secret"));
    }

    #[test]
    fn blank_strings_count_as_unset() {
        assert_eq!(non_blank(&Some("  ".into())), None);
        assert_eq!(non_blank(&None), None);
        assert_eq!(non_blank(&Some(" x ".into())), Some("x"));
    }
}
