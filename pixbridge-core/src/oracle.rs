//! Rate oracle: a short-lived cache in front of the price source.

use crate::clients::{PriceError, PriceSource};
use crate::config::OracleConfig;
use crate::events::{EventBus, SettlementEvent};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

/// Process-scoped USDT/BRL cache. Orders store their own locked rate, so
/// nothing here is authoritative.
pub struct RateOracle {
    source: Arc<dyn PriceSource>,
    bus: EventBus,
    config: OracleConfig,
    cache: Mutex<Option<CachedRate>>,
}

impl RateOracle {
    pub fn new(source: Arc<dyn PriceSource>, bus: EventBus, config: OracleConfig) -> Self {
        Self {
            source,
            bus,
            config,
            cache: Mutex::new(None),
        }
    }

    /// The cached rate while fresh, otherwise a newly fetched one.
    pub async fn current(&self) -> Result<Decimal, PriceError> {
        // held across the fetch so concurrent misses share one request
        let mut cache = self.cache.lock().await;
        if let Some(cached) = *cache
            && cached.fetched_at.elapsed() < self.config.ttl
        {
            return Ok(cached.rate);
        }
        let rate = self.fetch().await?;
        *cache = Some(CachedRate {
            rate,
            fetched_at: Instant::now(),
        });
        Ok(rate)
    }

    /// Fetch unconditionally and replace the cached value.
    pub async fn refresh(&self) -> Result<Decimal, PriceError> {
        let mut cache = self.cache.lock().await;
        let rate = self.fetch().await?;
        *cache = Some(CachedRate {
            rate,
            fetched_at: Instant::now(),
        });
        Ok(rate)
    }

    async fn fetch(&self) -> Result<Decimal, PriceError> {
        let rate = self.source.fetch_brl().await?;
        if rate <= Decimal::ZERO {
            return Err(PriceError::NonPositive(rate));
        }
        debug!(rate = %rate, "Fetched USDT/BRL rate");
        self.bus.publish(SettlementEvent::PriceUpdated { rate });
        Ok(rate)
    }

    /// Keep the cache warm until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("RateOracle started");
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("RateOracle received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!(error = %e, "Failed to refresh USDT/BRL rate");
                    }
                }
            }
        }

        info!("RateOracle shutdown complete");
    }
}
