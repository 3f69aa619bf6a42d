//! Background processors.
//!
//! - `DepositWatcher`: scans the chain, emits `DepositDetected` and `PayoutRequested`
//! - `PayoutDispatcher`: receives `PayoutRequested`, sends PIX, emits `PayoutSettled`
//! - `SweepConsolidator`: periodically moves deposits to the treasury
//! - `BuySender`: receives `BuyOrderPaid`, sends tokens to the buyer
//!
//! Each exposes `run(self: Arc<Self>, .., shutdown_rx)` and stops when the
//! shutdown signal flips to `true`.

pub mod buy_sender;
pub mod deposit_watcher;
pub mod payout_dispatcher;
pub mod sweep_consolidator;

pub use buy_sender::{BuyOrderPaid, BuySendError, BuySendOutcome, BuySender};
pub use deposit_watcher::{
    DepositOutcome, DepositRules, DepositWatcher, ScanReport, WatchError, settle_deposit,
};
pub use payout_dispatcher::{
    DispatchError, PayoutDispatcher, PayoutOutcome, PayoutRequest, SkipReason,
};
pub use sweep_consolidator::{SweepConsolidator, SweepError, SweepReport};
