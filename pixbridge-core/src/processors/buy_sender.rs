//! BuySender processor.
//!
//! The BuySender is responsible for:
//! - Receiving `BuyOrderPaid` events via the `Processor` trait
//! - Sending the locked token amount from the hot wallet to the buyer
//! - Moving the buy order through `enviado_onchain` to `concluída`, or to `erro`
//! - Periodically retrying `pago_pix` orders whose event was missed

use crate::clients::{Signer, TransferRequest};
use crate::config::BuySendConfig;
use crate::entities::{BuyOrderPatch, BuyOrderStatus, Transition, TransitionError};
use crate::events::{SettlementEvent, Subscription};
use crate::store::{LedgerStore, StoreError};
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BuySendError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Input of the sender: the buyer's PIX charge was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyOrderPaid {
    pub buy_order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuySendOutcome {
    Sent { tx_hash: String },
    Failed { error: String },
    /// No signer configured; the order stays `pago_pix`.
    NotConfigured,
    Skipped,
}

/// BuySender delivers tokens for paid on-ramp orders.
pub struct BuySender {
    store: Arc<dyn LedgerStore>,
    signer: Option<Arc<dyn Signer>>,
    config: BuySendConfig,
}

impl BuySender {
    pub fn new(store: Arc<dyn LedgerStore>, signer: Option<Arc<dyn Signer>>, config: BuySendConfig) -> Self {
        Self {
            store,
            signer,
            config,
        }
    }

    /// Attempt every buy order sitting in `pago_pix`.
    ///
    /// The signer deduplicates on `buy-{id}`, so racing the event path can
    /// never send twice.
    pub async fn send_due(&self) -> Result<usize, BuySendError> {
        let due = self.store.buy_orders_awaiting_send().await?;
        let mut handled = 0;
        for order in due {
            match self
                .process(BuyOrderPaid {
                    buy_order_id: order.id,
                })
                .await
            {
                Ok(BuySendOutcome::Sent { .. } | BuySendOutcome::Failed { .. }) => handled += 1,
                Ok(_) => {}
                Err(e) => error!(buy_order_id = %order.id, error = %e, "Buy send pass failed"),
            }
        }
        Ok(handled)
    }

    /// Run the BuySender until shutdown.
    pub async fn run(self: Arc<Self>, mut paid: Subscription, mut shutdown_rx: watch::Receiver<bool>) {
        info!(configured = self.signer.is_some(), "BuySender started");
        let mut interval = tokio::time::interval(self.config.retry_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("BuySender received shutdown signal");
                        break;
                    }
                }

                Some(event) = paid.recv() => {
                    if let SettlementEvent::BuyOrderPaid { buy_order_id } = event
                        && let Err(e) = self.process(BuyOrderPaid { buy_order_id }).await
                    {
                        error!(buy_order_id = %buy_order_id, error = %e, "Failed to send buy order");
                    }
                }

                _ = interval.tick(), if self.signer.is_some() => {
                    match self.send_due().await {
                        Ok(0) => {}
                        Ok(n) => info!(count = n, "Dispatched pending buy orders"),
                        Err(e) => error!(error = %e, "Failed to load pending buy orders"),
                    }
                }
            }
        }

        info!("BuySender shutdown complete");
    }
}

impl Processor<BuyOrderPaid> for BuySender {
    type Output = BuySendOutcome;
    type Error = BuySendError;

    async fn process(&self, event: BuyOrderPaid) -> Result<BuySendOutcome, BuySendError> {
        let id = event.buy_order_id;
        let Some(order) = self.store.get_buy_order(id).await? else {
            warn!(buy_order_id = %id, "Paid event for unknown buy order");
            return Ok(BuySendOutcome::Skipped);
        };
        if order.status != BuyOrderStatus::PixReceived {
            debug!(buy_order_id = %id, status = ?order.status, "Buy order not awaiting send");
            return Ok(BuySendOutcome::Skipped);
        }
        let Some(signer) = &self.signer else {
            error!(buy_order_id = %id, "No signer configured, buy order left in pago_pix");
            return Ok(BuySendOutcome::NotConfigured);
        };

        let request = TransferRequest {
            derivation_index: self.config.hot_derivation_index,
            to: order.dest_address.clone(),
            amount: order.crypto_amount.normalize().to_string(),
            token_contract: self.config.token_contract.clone(),
            idempotency_key: format!("buy-{id}"),
        };
        match signer.transfer(&request).await {
            Ok(tx_hash) => {
                let sent = Transition::new(BuyOrderStatus::PixReceived, BuyOrderStatus::SentOnchain)?;
                if !self
                    .store
                    .transition_buy_order(id, sent, BuyOrderPatch::sent(tx_hash.clone()))
                    .await?
                {
                    return Ok(BuySendOutcome::Skipped);
                }
                let done = Transition::new(BuyOrderStatus::SentOnchain, BuyOrderStatus::Completed)?;
                if !self
                    .store
                    .transition_buy_order(id, done, BuyOrderPatch::sent(tx_hash.clone()))
                    .await?
                {
                    warn!(buy_order_id = %id, tx_hash = %tx_hash, "Buy order left enviado_onchain, completion raced");
                }
                info!(buy_order_id = %id, tx_hash = %tx_hash, amount = %order.crypto_amount, "Buy order delivered");
                Ok(BuySendOutcome::Sent { tx_hash })
            }
            Err(e) => {
                let error = e.to_string();
                error!(buy_order_id = %id, error = %error, "Buy order transfer failed");
                let failed = Transition::new(BuyOrderStatus::PixReceived, BuyOrderStatus::Failed)?;
                self.store
                    .transition_buy_order(id, failed, BuyOrderPatch::failed(error.clone()))
                    .await?;
                Ok(BuySendOutcome::Failed { error })
            }
        }
    }
}
