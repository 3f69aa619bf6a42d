//! In-process event bus.
//!
//! # Event Flow
//!
//! 1. `OrderService` emits `OrderCreated` -> `DepositWatcher` (early scan nudge)
//! 2. `DepositWatcher` emits `DepositDetected` and `PayoutRequested` -> `PayoutDispatcher`
//! 3. `PayoutDispatcher` emits `PayoutSettled`
//! 4. PIX webhook emits `BuyOrderPaid` -> `BuySender`
//! 5. `RateOracle` emits `PriceUpdated`
//!
//! Events carry identifiers rather than full data. Every handler re-reads
//! the Ledger Store before acting, so a lost or duplicated event never
//! corrupts state.

pub mod bus;
pub mod types;

pub use bus::{DEFAULT_CHANNEL_BUFFER, EventBus, Subscription};
pub use types::{EventKind, SettlementEvent};
