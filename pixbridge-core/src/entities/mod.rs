pub mod buy_order;
pub mod ledger_event;
pub mod order;
pub mod sweep;

pub use buy_order::{BuyOrder, BuyOrderPatch, NewBuyOrder};
pub use ledger_event::{LedgerEvent, NewLedgerEvent};
pub use order::{DepositVerdict, NewOrder, Order, OrderPatch};
pub use sweep::{NewSweep, Sweep};

use pixbridge_sdk::objects::{
    BuyOrderStatus as SdkBuyOrderStatus, Network as SdkNetwork, OrderStatus as SdkOrderStatus,
};
use thiserror::Error;

/// Settlement network for database operations.
///
/// Closed on purpose: each variant carries its own address and derivation
/// scheme, see [`crate::chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "network")]
pub enum Network {
    #[sqlx(rename = "TRON")]
    Tron,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tron => "TRON",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Network> for SdkNetwork {
    fn from(value: Network) -> Self {
        match value {
            Network::Tron => SdkNetwork::Tron,
        }
    }
}

impl From<SdkNetwork> for Network {
    fn from(value: SdkNetwork) -> Self {
        match value {
            SdkNetwork::Tron => Network::Tron,
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycles
// ---------------------------------------------------------------------------

/// A status enum with a fixed table of allowed transitions.
pub trait Lifecycle: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Prefix of the ledger entries recording this lifecycle (`order`, `buy`, `sweep`).
    const ENTITY: &'static str;

    fn as_str(self) -> &'static str;

    fn allows(self, next: Self) -> bool;

    fn is_terminal(self) -> bool;

    /// Ledger entry type recorded when entering this status, e.g. `order.pago`.
    fn event_type(self) -> String {
        format!("{}.{}", Self::ENTITY, self.as_str())
    }
}

/// A status change that has been checked against the lifecycle table.
///
/// Only constructible through [`Transition::new`], so the store never sees
/// an undocumented edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S: Lifecycle> {
    from: S,
    to: S,
}

impl<S: Lifecycle> Transition<S> {
    pub fn new(from: S, to: S) -> Result<Self, TransitionError> {
        if from.allows(to) {
            Ok(Self { from, to })
        } else {
            Err(TransitionError {
                entity: S::ENTITY,
                from: from.as_str(),
                to: to.as_str(),
            })
        }
    }

    pub fn from(&self) -> S {
        self.from
    }

    pub fn to(&self) -> S {
        self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {entity} transition {from} -> {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

/// Off-ramp order status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "order_status")]
pub enum OrderStatus {
    #[sqlx(rename = "aguardando_deposito")]
    AwaitingDeposit,
    #[sqlx(rename = "pago")]
    Paid,
    #[sqlx(rename = "concluída")]
    Completed,
    #[sqlx(rename = "erro")]
    Failed,
    #[sqlx(rename = "aguardando_validacao")]
    AwaitingReview,
    #[sqlx(rename = "expirada")]
    Expired,
}

impl Lifecycle for OrderStatus {
    const ENTITY: &'static str = "order";

    fn as_str(self) -> &'static str {
        match self {
            OrderStatus::AwaitingDeposit => "aguardando_deposito",
            OrderStatus::Paid => "pago",
            OrderStatus::Completed => "concluída",
            OrderStatus::Failed => "erro",
            OrderStatus::AwaitingReview => "aguardando_validacao",
            OrderStatus::Expired => "expirada",
        }
    }

    fn allows(self, next: Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (AwaitingDeposit, Paid)
                | (AwaitingDeposit, AwaitingReview)
                | (AwaitingDeposit, Expired)
                | (Paid, Completed)
                | (Paid, Failed)
        )
    }

    fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::AwaitingDeposit | OrderStatus::Paid)
    }
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::AwaitingDeposit => SdkOrderStatus::AwaitingDeposit,
            OrderStatus::Paid => SdkOrderStatus::Paid,
            OrderStatus::Completed => SdkOrderStatus::Completed,
            OrderStatus::Failed => SdkOrderStatus::Failed,
            OrderStatus::AwaitingReview => SdkOrderStatus::AwaitingReview,
            OrderStatus::Expired => SdkOrderStatus::Expired,
        }
    }
}

/// On-ramp buy order status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "buy_order_status")]
pub enum BuyOrderStatus {
    #[sqlx(rename = "aguardando_pix")]
    AwaitingPix,
    #[sqlx(rename = "pago_pix")]
    PixReceived,
    #[sqlx(rename = "enviado_onchain")]
    SentOnchain,
    #[sqlx(rename = "concluída")]
    Completed,
    #[sqlx(rename = "erro")]
    Failed,
}

impl Lifecycle for BuyOrderStatus {
    const ENTITY: &'static str = "buy";

    fn as_str(self) -> &'static str {
        match self {
            BuyOrderStatus::AwaitingPix => "aguardando_pix",
            BuyOrderStatus::PixReceived => "pago_pix",
            BuyOrderStatus::SentOnchain => "enviado_onchain",
            BuyOrderStatus::Completed => "concluída",
            BuyOrderStatus::Failed => "erro",
        }
    }

    fn allows(self, next: Self) -> bool {
        use BuyOrderStatus::*;
        matches!(
            (self, next),
            (AwaitingPix, PixReceived)
                | (PixReceived, SentOnchain)
                | (PixReceived, Failed)
                | (SentOnchain, Completed)
                | (SentOnchain, Failed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, BuyOrderStatus::Completed | BuyOrderStatus::Failed)
    }
}

impl From<BuyOrderStatus> for SdkBuyOrderStatus {
    fn from(value: BuyOrderStatus) -> Self {
        match value {
            BuyOrderStatus::AwaitingPix => SdkBuyOrderStatus::AwaitingPix,
            BuyOrderStatus::PixReceived => SdkBuyOrderStatus::PixReceived,
            BuyOrderStatus::SentOnchain => SdkBuyOrderStatus::SentOnchain,
            BuyOrderStatus::Completed => SdkBuyOrderStatus::Completed,
            BuyOrderStatus::Failed => SdkBuyOrderStatus::Failed,
        }
    }
}

/// Sweep status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "sweep_status")]
pub enum SweepStatus {
    Pending,
    Sent,
    Confirmed,
    Failed,
}

impl SweepStatus {
    /// Statuses that count as the one live sweep of an order.
    pub const ACTIVE: [SweepStatus; 3] = [SweepStatus::Pending, SweepStatus::Sent, SweepStatus::Confirmed];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }
}

impl Lifecycle for SweepStatus {
    const ENTITY: &'static str = "sweep";

    fn as_str(self) -> &'static str {
        match self {
            SweepStatus::Pending => "pending",
            SweepStatus::Sent => "sent",
            SweepStatus::Confirmed => "confirmed",
            SweepStatus::Failed => "failed",
        }
    }

    fn allows(self, next: Self) -> bool {
        use SweepStatus::*;
        matches!(
            (self, next),
            (Pending, Sent) | (Pending, Failed) | (Sent, Confirmed) | (Sent, Failed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, SweepStatus::Confirmed | SweepStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_lifecycle_table() {
        use OrderStatus::*;
        assert!(Transition::new(AwaitingDeposit, Paid).is_ok());
        assert!(Transition::new(AwaitingDeposit, AwaitingReview).is_ok());
        assert!(Transition::new(AwaitingDeposit, Expired).is_ok());
        assert!(Transition::new(Paid, Completed).is_ok());
        assert!(Transition::new(Paid, Failed).is_ok());

        // replays and skips are rejected, not ignored
        let err = Transition::new(Paid, Paid).unwrap_err();
        assert_eq!(err.to_string(), "invalid order transition pago -> pago");
        assert!(Transition::new(AwaitingDeposit, Completed).is_err());
        assert!(Transition::new(Expired, Paid).is_err());
        assert!(Transition::new(AwaitingReview, Paid).is_err());
        assert!(Transition::new(Completed, Failed).is_err());
    }

    #[test]
    fn buy_order_lifecycle_table() {
        use BuyOrderStatus::*;
        assert!(Transition::new(AwaitingPix, PixReceived).is_ok());
        assert!(Transition::new(PixReceived, SentOnchain).is_ok());
        assert!(Transition::new(SentOnchain, Completed).is_ok());
        assert!(Transition::new(PixReceived, Failed).is_ok());
        assert!(Transition::new(AwaitingPix, SentOnchain).is_err());
        assert!(Transition::new(PixReceived, PixReceived).is_err());
        assert!(Completed.is_terminal());
        assert!(!SentOnchain.is_terminal());
    }

    #[test]
    fn sweep_lifecycle_and_activity() {
        use SweepStatus::*;
        assert!(Transition::new(Pending, Sent).is_ok());
        assert!(Transition::new(Pending, Failed).is_ok());
        assert!(Transition::new(Failed, Pending).is_err());
        assert!(Pending.is_active() && Sent.is_active() && Confirmed.is_active());
        assert!(!Failed.is_active());
    }

    #[test]
    fn ledger_event_types() {
        assert_eq!(OrderStatus::Paid.event_type(), "order.pago");
        assert_eq!(BuyOrderStatus::PixReceived.event_type(), "buy.pago_pix");
        assert_eq!(SweepStatus::Sent.event_type(), "sweep.sent");
    }
}
