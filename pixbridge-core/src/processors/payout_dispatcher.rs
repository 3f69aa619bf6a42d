//! PayoutDispatcher processor.
//!
//! The PayoutDispatcher is responsible for:
//! - Receiving `PayoutRequested` events via the `Processor` trait
//! - Claiming the payout so each order is paid at most once
//! - Sending the net fiat amount through the PIX provider
//! - Moving the order to `concluída` or `erro` and emitting `PayoutSettled`
//! - Periodically retrying `pago` orders whose hold elapsed or whose event
//!   was missed

use crate::clients::{PixPayout, PixProvider};
use crate::config::PayoutConfig;
use crate::entities::{Order, OrderPatch, OrderStatus, Transition, TransitionError};
use crate::events::{EventBus, SettlementEvent, Subscription};
use crate::store::{LedgerStore, StoreError};
use kanau::processor::Processor;
use pixbridge_sdk::objects::PayoutResult;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Input of the dispatcher: pay out this order if it is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
    Settled { reference: String },
    /// No provider configured; the order completed with a synthetic reference.
    Simulated { reference: String },
    Failed { error: String },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    NotPaid(OrderStatus),
    Held,
    AlreadyClaimed,
}

/// PayoutDispatcher sends PIX payouts for paid orders.
pub struct PayoutDispatcher {
    store: Arc<dyn LedgerStore>,
    bus: EventBus,
    provider: Option<Arc<dyn PixProvider>>,
    config: PayoutConfig,
}

impl PayoutDispatcher {
    /// `provider: None` runs in simulation mode.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        bus: EventBus,
        provider: Option<Arc<dyn PixProvider>>,
        config: PayoutConfig,
    ) -> Self {
        Self {
            store,
            bus,
            provider,
            config,
        }
    }

    async fn pay(&self, order: &Order) -> PayoutOutcome {
        let Some(provider) = &self.provider else {
            let reference = format!("pix-sim-{}", order.id);
            warn!(order_id = %order.id, amount = %order.payout_brl, "No PIX provider configured, simulating payout");
            return PayoutOutcome::Simulated { reference };
        };
        let Some(key) = order.payee_key() else {
            return PayoutOutcome::Failed {
                error: crate::clients::PixError::MissingKey.to_string(),
            };
        };
        let payout = PixPayout {
            reference: order.id,
            amount_brl: order.payout_brl,
            key: key.to_string(),
            payer_tax_id: order.pix_cpf.clone(),
            description: format!("pixbridge order {}", order.id),
        };
        match provider.send_payout(&payout).await {
            Ok(reference) => PayoutOutcome::Settled { reference },
            Err(e) => PayoutOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    async fn finish(&self, order: &Order, outcome: &PayoutOutcome) -> Result<(), DispatchError> {
        let (status, patch, result, reference) = match outcome {
            PayoutOutcome::Settled { reference } | PayoutOutcome::Simulated { reference } => (
                OrderStatus::Completed,
                OrderPatch::settled(reference.clone()),
                PayoutResult::Completed,
                reference.clone(),
            ),
            PayoutOutcome::Failed { error } => (
                OrderStatus::Failed,
                OrderPatch::failed(error.clone()),
                PayoutResult::Failed,
                String::new(),
            ),
            PayoutOutcome::Skipped(_) => return Ok(()),
        };

        let transition = Transition::new(OrderStatus::Paid, status)?;
        if !self.store.transition_order(order.id, transition, patch).await? {
            // a provider webhook settled it while we were waiting
            debug!(order_id = %order.id, "Order settled concurrently");
            return Ok(());
        }
        match outcome {
            PayoutOutcome::Failed { error } => {
                error!(order_id = %order.id, error = %error, "PIX payout failed");
            }
            _ => {
                info!(order_id = %order.id, reference = %reference, "PIX payout completed");
            }
        }
        self.bus.publish(SettlementEvent::PayoutSettled {
            order_id: order.id,
            reference,
            result,
        });
        Ok(())
    }

    /// Attempt every payout that is due now.
    pub async fn sweep_due(&self) -> Result<usize, DispatchError> {
        let due = self
            .store
            .orders_due_for_payout(OffsetDateTime::now_utc())
            .await?;
        let mut settled = 0;
        for order in due {
            match self.process(PayoutRequest { order_id: order.id }).await {
                Ok(PayoutOutcome::Skipped(_)) => {}
                Ok(_) => settled += 1,
                Err(e) => error!(order_id = %order.id, error = %e, "Payout pass failed"),
            }
        }
        Ok(settled)
    }

    /// Run the PayoutDispatcher until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut requests: Subscription,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(simulated = self.provider.is_none(), "PayoutDispatcher started");
        let mut interval = tokio::time::interval(self.config.retry_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("PayoutDispatcher received shutdown signal");
                        break;
                    }
                }

                Some(event) = requests.recv() => {
                    if let SettlementEvent::PayoutRequested { order_id } = event
                        && let Err(e) = self.process(PayoutRequest { order_id }).await
                    {
                        error!(order_id = %order_id, error = %e, "Failed to dispatch payout");
                    }
                }

                _ = interval.tick() => {
                    match self.sweep_due().await {
                        Ok(0) => {}
                        Ok(n) => info!(count = n, "Dispatched due payouts"),
                        Err(e) => error!(error = %e, "Failed to load due payouts"),
                    }
                }
            }
        }

        info!("PayoutDispatcher shutdown complete");
    }
}

impl Processor<PayoutRequest> for PayoutDispatcher {
    type Output = PayoutOutcome;
    type Error = DispatchError;

    async fn process(&self, request: PayoutRequest) -> Result<PayoutOutcome, DispatchError> {
        let now = OffsetDateTime::now_utc();
        let Some(order) = self.store.get_order(request.order_id).await? else {
            warn!(order_id = %request.order_id, "Payout requested for unknown order");
            return Ok(PayoutOutcome::Skipped(SkipReason::NotFound));
        };
        if order.status != OrderStatus::Paid {
            debug!(order_id = %order.id, status = ?order.status, "Order not payable");
            return Ok(PayoutOutcome::Skipped(SkipReason::NotPaid(order.status)));
        }
        if order.payout_not_before.is_some_and(|t| t > now) {
            debug!(order_id = %order.id, "Payout still on hold");
            return Ok(PayoutOutcome::Skipped(SkipReason::Held));
        }
        if !self.store.claim_payout(order.id, now).await? {
            debug!(order_id = %order.id, "Payout already claimed");
            return Ok(PayoutOutcome::Skipped(SkipReason::AlreadyClaimed));
        }

        let outcome = self.pay(&order).await;
        self.finish(&order, &outcome).await?;
        Ok(outcome)
    }
}
