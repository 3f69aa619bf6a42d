//! DepositWatcher processor.
//!
//! The DepositWatcher is responsible for:
//! - Expiring stale pending orders at the start of each scan
//! - Resuming the block scan from the persisted cursor (or a lookback window)
//! - Paging through confirmed token `Transfer` events block by block
//! - Matching transfers to pending orders by deposit address
//! - Moving matched orders to `pago`, `aguardando_validacao` or `expirada`
//! - Emitting `DepositDetected` and `PayoutRequested`
//!
//! Only one scan runs at a time; a scan requested while another is in
//! flight returns immediately.

use crate::chain::{ChainClient, ChainError, TransferEvent, TransferPage};
use crate::config::WatcherConfig;
use crate::entities::{
    DepositVerdict, Lifecycle, Order, OrderPatch, OrderStatus, Transition, TransitionError,
};
use crate::events::{EventBus, SettlementEvent, Subscription};
use crate::store::{LedgerStore, StoreError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Errors that abort a scan cycle. The next cycle resumes from the last
/// persisted cursor.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Business rules applied when a deposit is observed, whichever way it
/// arrives (chain scan or trusted notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositRules {
    pub tolerance: Decimal,
    pub new_payee_hold: time::Duration,
}

impl From<&WatcherConfig> for DepositRules {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            tolerance: config.tolerance,
            new_payee_hold: config.new_payee_hold,
        }
    }
}

/// What happened to an order when a deposit was applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositOutcome {
    /// Moved to `pago`. `held_until` is set for a first-time payee.
    Paid { held_until: Option<OffsetDateTime> },
    /// Moved to `aguardando_validacao`.
    OutOfTolerance,
    /// Rate lock had ended; moved to `expirada` and the deposit was not applied.
    Expired,
    /// This transaction was already applied to this order.
    Duplicate,
    /// Another writer changed the order first.
    AlreadyHandled,
}

/// Apply one observed deposit to an order that was `aguardando_deposito`
/// when read.
///
/// The ledger is consulted first so a replayed transaction never counts
/// twice, and every status change is a conditional update.
pub async fn settle_deposit(
    store: &dyn LedgerStore,
    bus: &EventBus,
    rules: DepositRules,
    order: &Order,
    tx_id: &str,
    amount: Decimal,
    now: OffsetDateTime,
) -> Result<DepositOutcome, WatchError> {
    let paid_event = OrderStatus::Paid.event_type();
    if store
        .has_event(order.id, &paid_event, "depositTx", tx_id)
        .await?
    {
        debug!(order_id = %order.id, tx_id, "Deposit already applied");
        return Ok(DepositOutcome::Duplicate);
    }

    match order.evaluate_deposit(amount, now, rules.tolerance) {
        DepositVerdict::Expired => {
            let transition = Transition::new(order.status, OrderStatus::Expired)?;
            if !store
                .transition_order(order.id, transition, OrderPatch::failed("rate lock expired before deposit"))
                .await?
            {
                return Ok(DepositOutcome::AlreadyHandled);
            }
            warn!(order_id = %order.id, tx_id, amount = %amount, "Deposit arrived after rate lock, order expired");
            Ok(DepositOutcome::Expired)
        }
        DepositVerdict::OutOfTolerance => {
            let transition = Transition::new(order.status, OrderStatus::AwaitingReview)?;
            if !store
                .transition_order(order.id, transition, OrderPatch::deposit(tx_id, amount))
                .await?
            {
                return Ok(DepositOutcome::AlreadyHandled);
            }
            warn!(
                order_id = %order.id,
                tx_id,
                amount = %amount,
                expected = %order.crypto_amount,
                "Deposit outside tolerance, order held for review"
            );
            Ok(DepositOutcome::OutOfTolerance)
        }
        DepositVerdict::Accept => {
            let returning_payee = store
                .payee_has_completed_order(order.pix_cpf.as_deref(), order.pix_phone.as_deref())
                .await?;
            let held_until = (!returning_payee && rules.new_payee_hold.is_positive())
                .then(|| now + rules.new_payee_hold);

            let transition = Transition::new(order.status, OrderStatus::Paid)?;
            let patch = OrderPatch::deposit(tx_id, amount).hold_until(held_until);
            if !store.transition_order(order.id, transition, patch).await? {
                return Ok(DepositOutcome::AlreadyHandled);
            }
            info!(order_id = %order.id, tx_id, amount = %amount, "Deposit confirmed, order paid");

            bus.publish(SettlementEvent::DepositDetected {
                order_id: order.id,
                tx_id: tx_id.to_string(),
                amount,
            });
            match held_until {
                Some(until) => {
                    info!(order_id = %order.id, until = %until, "New payee, payout held");
                }
                None => {
                    bus.publish(SettlementEvent::PayoutRequested { order_id: order.id });
                }
            }
            Ok(DepositOutcome::Paid { held_until })
        }
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Another scan was in flight; nothing was done.
    pub skipped: bool,
    pub stale_expired: usize,
    pub blocks_scanned: u64,
    pub paid: u32,
    pub out_of_tolerance: u32,
    pub expired: u32,
    pub duplicates: u32,
}

/// DepositWatcher scans the chain for deposits to pending orders.
pub struct DepositWatcher {
    store: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainClient>,
    bus: EventBus,
    config: WatcherConfig,
    in_flight: Mutex<()>,
}

impl DepositWatcher {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainClient>,
        bus: EventBus,
        config: WatcherConfig,
    ) -> Self {
        Self {
            store,
            chain,
            bus,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one scan cycle.
    pub async fn scan(&self) -> Result<ScanReport, WatchError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Scan already in flight, skipping");
            return Ok(ScanReport {
                skipped: true,
                ..Default::default()
            });
        };

        let mut report = ScanReport::default();
        let network = self.chain.network();
        let now = OffsetDateTime::now_utc();

        let stale = self
            .store
            .expire_stale_orders(now - self.config.stale_after)
            .await?;
        if !stale.is_empty() {
            info!(count = stale.len(), "Expired stale pending orders");
        }
        report.stale_expired = stale.len();

        let pending = self.store.pending_deposit_orders(network).await?;
        let head = self.chain.latest_block().await?;
        let latest_confirmed = (head - self.config.confirmations).max(0);

        if pending.is_empty() {
            // keep the cursor moving so a later burst of orders starts near the head
            self.store.save_cursor(network, latest_confirmed).await?;
            debug!(%network, block = latest_confirmed, "No pending orders, cursor advanced");
            return Ok(report);
        }

        let mut by_address: HashMap<String, Order> = pending
            .into_iter()
            .map(|order| (order.address.clone(), order))
            .collect();

        let start = match self.store.get_cursor(network).await? {
            Some(cursor) => cursor + 1,
            None => (latest_confirmed - self.config.lookback_blocks).max(0),
        };
        debug!(
            %network,
            from = start,
            to = latest_confirmed,
            pending = by_address.len(),
            "Scanning for deposits"
        );

        for block in start..=latest_confirmed {
            let mut page: Option<String> = None;
            loop {
                let TransferPage { events, next } = self
                    .chain
                    .transfer_events(&self.config.token_contract, block, page.as_deref())
                    .await?;
                for event in events {
                    self.handle_event(&mut by_address, event, latest_confirmed, now, &mut report)
                        .await?;
                }
                match next {
                    Some(fingerprint) => page = Some(fingerprint),
                    None => break,
                }
            }
            self.store.save_cursor(network, block).await?;
            report.blocks_scanned += 1;

            if by_address.is_empty() {
                self.store.save_cursor(network, latest_confirmed).await?;
                debug!(%network, block = latest_confirmed, "Working set drained, cursor advanced");
                break;
            }
        }

        Ok(report)
    }

    async fn handle_event(
        &self,
        by_address: &mut HashMap<String, Order>,
        event: TransferEvent,
        latest_confirmed: i64,
        now: OffsetDateTime,
        report: &mut ScanReport,
    ) -> Result<(), WatchError> {
        let Some(order) = by_address.get(&event.to) else {
            return Ok(());
        };
        if order.status != OrderStatus::AwaitingDeposit {
            by_address.remove(&event.to);
            return Ok(());
        }
        if event.block_number > latest_confirmed {
            debug!(order_id = %order.id, tx_id = %event.tx_id, block = event.block_number, "Transfer not yet confirmed");
            return Ok(());
        }
        let amount = match event.amount(self.config.token_decimals) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(order_id = %order.id, tx_id = %event.tx_id, error = %e, "Ignoring unparsable transfer");
                return Ok(());
            }
        };

        let rules = DepositRules::from(&self.config);
        let outcome = settle_deposit(
            self.store.as_ref(),
            &self.bus,
            rules,
            order,
            &event.tx_id,
            amount,
            now,
        )
        .await?;
        match outcome {
            DepositOutcome::Paid { .. } => report.paid += 1,
            DepositOutcome::OutOfTolerance => report.out_of_tolerance += 1,
            DepositOutcome::Expired => report.expired += 1,
            DepositOutcome::Duplicate => report.duplicates += 1,
            DepositOutcome::AlreadyHandled => {}
        }
        by_address.remove(&event.to);
        Ok(())
    }

    /// Run the DepositWatcher on its polling interval until shutdown.
    ///
    /// `order_created` nudges an early scan when a new order arrives.
    pub async fn run(
        self: Arc<Self>,
        mut order_created: Subscription,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(network = %self.chain.network(), "DepositWatcher started");
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("DepositWatcher received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    self.scan_logged().await;
                }

                Some(event) = order_created.recv() => {
                    debug!(?event, "Received OrderCreated");
                    self.scan_logged().await;
                }
            }
        }

        info!("DepositWatcher shutdown complete");
    }

    async fn scan_logged(&self) {
        match self.scan().await {
            Ok(report) if report.paid + report.out_of_tolerance + report.expired > 0 => {
                info!(
                    blocks = report.blocks_scanned,
                    paid = report.paid,
                    out_of_tolerance = report.out_of_tolerance,
                    expired = report.expired,
                    "Scan completed"
                );
            }
            Ok(report) => {
                debug!(blocks = report.blocks_scanned, "Scan completed");
            }
            Err(e) => {
                error!(error = %e, "Deposit scan failed");
            }
        }
    }
}
