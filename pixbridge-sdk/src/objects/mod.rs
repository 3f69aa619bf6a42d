pub mod notifications;
pub mod orders;
pub mod status;

pub use notifications::{
    DepositNotification, NotificationAck, PayoutNotification, PayoutResult, ProviderStatus,
    ProviderWebhook, WebhookAck,
};
pub use orders::{
    BuyOrderResponse, CreateBuyOrderRequest, CreateOrderRequest, OrderResponse, PriceResponse,
    StatusFrame,
};
pub use status::{BuyOrderStatus, Network, OrderStatus};
