//! SweepConsolidator processor.
//!
//! The SweepConsolidator is responsible for:
//! - Creating one `pending` sweep per paid order holding funds at a derived address
//! - Checking each source address has enough native balance for fees
//! - Asking the signer to transfer the deposit to the treasury
//! - Recording `sent` with the transaction hash, or `failed`
//!
//! In stub mode pending sweeps are marked `sent` with a synthetic hash and no
//! funds move. Stub mode cannot be combined with a signer.

use crate::chain::{AddressAllocator, AllocatorError, ChainClient};
use crate::clients::{Signer, TransferRequest};
use crate::config::{SweepConfig, SweepMode};
use crate::entities::{NewSweep, Sweep, SweepStatus, Transition, TransitionError};
use crate::store::{LedgerStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("address derivation error: {0}")]
    Allocator(#[from] AllocatorError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("live sweeps need a signer")]
    SignerMissing,
    #[error("stub sweeps cannot run with a signer configured")]
    StubWithSigner,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub created: u32,
    pub sent: u32,
    pub failed: u32,
    /// Left `pending` because the source lacked fee balance or could not be checked.
    pub deferred: u32,
}

/// SweepConsolidator moves deposits from per-order addresses to the treasury.
pub struct SweepConsolidator {
    store: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainClient>,
    allocator: AddressAllocator,
    signer: Option<Arc<dyn Signer>>,
    config: SweepConfig,
}

impl SweepConsolidator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainClient>,
        allocator: AddressAllocator,
        signer: Option<Arc<dyn Signer>>,
        config: SweepConfig,
    ) -> Result<Self, SweepError> {
        match (config.mode, signer.is_some()) {
            (SweepMode::Stub, true) => return Err(SweepError::StubWithSigner),
            (SweepMode::Live, false) => return Err(SweepError::SignerMissing),
            _ => {}
        }
        Ok(Self {
            store,
            chain,
            allocator,
            signer,
            config,
        })
    }

    /// One create phase followed by one dispatch phase.
    pub async fn cycle(&self) -> Result<SweepReport, SweepError> {
        let mut report = SweepReport::default();
        self.create_pending(&mut report).await?;
        self.dispatch_pending(&mut report).await?;
        Ok(report)
    }

    async fn create_pending(&self, report: &mut SweepReport) -> Result<(), SweepError> {
        for order in self.store.orders_to_sweep().await? {
            let (Some(index), Some(amount)) = (order.derivation_index, order.deposit_amount) else {
                continue;
            };
            let from_addr = self.allocator.derive(order.network, index)?;
            let sweep = NewSweep {
                child_index: index,
                from_addr,
                to_addr: self.config.treasury_address.clone(),
                amount,
                order_id: order.id,
            };
            if let Some(created) = self.store.create_sweep(sweep).await? {
                info!(sweep_id = %created.id, order_id = %order.id, amount = %amount, "Sweep created");
                report.created += 1;
            }
        }
        Ok(())
    }

    async fn dispatch_pending(&self, report: &mut SweepReport) -> Result<(), SweepError> {
        for sweep in self.store.pending_sweeps().await? {
            let signer = match (self.config.mode, &self.signer) {
                (SweepMode::Stub, _) => {
                    self.mark(&sweep, SweepStatus::Sent, Some(format!("sweep-sim-{}", sweep.id)))
                        .await?;
                    report.sent += 1;
                    continue;
                }
                (SweepMode::Live, Some(signer)) => signer,
                (SweepMode::Live, None) => return Err(SweepError::SignerMissing),
            };

            if !self.has_gas(&sweep).await {
                report.deferred += 1;
                continue;
            }

            let request = TransferRequest {
                derivation_index: sweep.child_index,
                to: sweep.to_addr.clone(),
                amount: sweep.amount.normalize().to_string(),
                token_contract: self.config.token_contract.clone(),
                idempotency_key: format!("sweep-{}", sweep.id),
            };
            match signer.transfer(&request).await {
                Ok(tx_hash) => {
                    info!(sweep_id = %sweep.id, tx_hash = %tx_hash, "Sweep broadcast");
                    self.mark(&sweep, SweepStatus::Sent, Some(tx_hash)).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    error!(sweep_id = %sweep.id, error = %e, "Sweep transfer failed");
                    self.mark(&sweep, SweepStatus::Failed, None).await?;
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn has_gas(&self, sweep: &Sweep) -> bool {
        match self.chain.native_balance(&sweep.from_addr).await {
            Ok(balance) if balance >= self.config.gas_reserve_sun => true,
            Ok(balance) => {
                warn!(
                    sweep_id = %sweep.id,
                    address = %sweep.from_addr,
                    balance,
                    required = self.config.gas_reserve_sun,
                    "Insufficient fee balance, sweep deferred"
                );
                false
            }
            Err(e) => {
                warn!(sweep_id = %sweep.id, error = %e, "Could not read fee balance, sweep deferred");
                false
            }
        }
    }

    async fn mark(
        &self,
        sweep: &Sweep,
        to: SweepStatus,
        tx_hash: Option<String>,
    ) -> Result<(), SweepError> {
        let transition = Transition::new(sweep.status, to)?;
        if !self.store.mark_sweep(sweep.id, transition, tx_hash).await? {
            debug!(sweep_id = %sweep.id, "Sweep changed concurrently");
        }
        Ok(())
    }

    /// Run the SweepConsolidator until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(mode = ?self.config.mode, "SweepConsolidator started");
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("SweepConsolidator received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    match self.cycle().await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(
                                created = report.created,
                                sent = report.sent,
                                failed = report.failed,
                                deferred = report.deferred,
                                "Sweep cycle completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Sweep cycle failed"),
                    }
                }
            }
        }

        info!("SweepConsolidator shutdown complete");
    }
}
