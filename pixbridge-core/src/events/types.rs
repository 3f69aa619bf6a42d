use crate::entities::Network;
use pixbridge_sdk::objects::PayoutResult;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Events published on the [`super::EventBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementEvent {
    /// A new off-ramp order is waiting for its deposit.
    OrderCreated { order_id: Uuid, network: Network },
    /// An order moved to `pago` after a matching deposit.
    DepositDetected {
        order_id: Uuid,
        tx_id: String,
        amount: Decimal,
    },
    /// An order is ready for its PIX payout.
    PayoutRequested { order_id: Uuid },
    /// An order's payout reached a terminal result.
    PayoutSettled {
        order_id: Uuid,
        reference: String,
        result: PayoutResult,
    },
    /// A buy order's PIX charge was paid.
    BuyOrderPaid { buy_order_id: Uuid },
    /// The rate oracle fetched a fresh USDT/BRL rate.
    PriceUpdated { rate: Decimal },
}

/// Subscription key: the event name without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderCreated,
    DepositDetected,
    PayoutRequested,
    PayoutSettled,
    BuyOrderPaid,
    PriceUpdated,
}

impl SettlementEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SettlementEvent::OrderCreated { .. } => EventKind::OrderCreated,
            SettlementEvent::DepositDetected { .. } => EventKind::DepositDetected,
            SettlementEvent::PayoutRequested { .. } => EventKind::PayoutRequested,
            SettlementEvent::PayoutSettled { .. } => EventKind::PayoutSettled,
            SettlementEvent::BuyOrderPaid { .. } => EventKind::BuyOrderPaid,
            SettlementEvent::PriceUpdated { .. } => EventKind::PriceUpdated,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::OrderCreated => "order.created",
            EventKind::DepositDetected => "deposit.detected",
            EventKind::PayoutRequested => "payout.requested",
            EventKind::PayoutSettled => "payout.settled",
            EventKind::BuyOrderPaid => "buy.paid",
            EventKind::PriceUpdated => "price.updated",
        };
        f.write_str(name)
    }
}
