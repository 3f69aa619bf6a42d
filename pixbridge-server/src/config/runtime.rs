//! Validated runtime configuration built from the file configuration.

use pixbridge_core::config::{
    BuySendConfig, Environment, OracleConfig, PayoutConfig, PricingConfig, SweepConfig,
    WatcherConfig,
};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Everything the server needs to wire its components.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub listen: SocketAddr,
    pub environment: Environment,
    pub pricing: PricingConfig,
    pub oracle: OracleConfig,
    pub price_source_url: Url,
    pub tron: TronAccess,
    pub watcher: WatcherConfig,
    pub payout: PayoutConfig,
    /// `None` selects simulated payouts.
    pub pix: Option<PixAccess>,
    pub signer: Option<SignerAccess>,
    pub buy_send: BuySendConfig,
    /// `None` when sweeps are disabled.
    pub sweep: Option<SweepConfig>,
    pub secrets: Secrets,
}

#[derive(Clone)]
pub struct TronAccess {
    pub full_node_url: Url,
    pub api_key: Option<String>,
    pub xpub: Option<String>,
}

#[derive(Clone)]
pub struct PixAccess {
    pub base_url: Url,
    pub token: String,
}

#[derive(Clone)]
pub struct SignerAccess {
    pub url: Url,
    pub hmac_secret: String,
    pub timeout: Duration,
}

/// HMAC secrets of the inbound authenticated endpoints. A missing secret
/// disables the endpoint.
#[derive(Clone, Default)]
pub struct Secrets {
    pub notification: Option<String>,
    pub provider_webhook: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("notification", &self.notification.is_some())
            .field("provider_webhook", &self.provider_webhook.is_some())
            .finish()
    }
}
