//! Request-side operations behind the HTTP API.

use crate::chain::{AddressAllocator, AllocatorError};
use crate::chain::address::normalize_tron_address;
use crate::clients::PriceError;
use crate::entities::{
    BuyOrder, BuyOrderPatch, BuyOrderStatus, Lifecycle, NewBuyOrder, NewLedgerEvent, NewOrder,
    Network, Order, OrderPatch, OrderStatus, Transition, TransitionError, ledger_event,
};
use crate::events::{EventBus, SettlementEvent};
use crate::oracle::RateOracle;
use crate::pricing::{QuoteError, quote};
use crate::config::PricingConfig;
use crate::processors::{DepositOutcome, DepositRules, WatchError, settle_deposit};
use crate::store::{LedgerStore, StoreError};
use pixbridge_sdk::objects::{
    CreateBuyOrderRequest, CreateOrderRequest, DepositNotification, NotificationAck,
    PayoutNotification, PayoutResult, ProviderStatus, ProviderWebhook, WebhookAck,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

/// Attempts at allocating a derivation index before giving up.
const ALLOCATION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error("price unavailable: {0}")]
    Price(#[from] PriceError),
    #[error("address allocation failed: {0}")]
    Allocator(#[from] AllocatorError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<WatchError> for ServiceError {
    fn from(e: WatchError) -> Self {
        match e {
            WatchError::Store(e) => ServiceError::Store(e),
            WatchError::Transition(e) => ServiceError::InvalidTransition(e),
            // settle_deposit never talks to the chain
            WatchError::Chain(e) => ServiceError::Validation(e.to_string()),
        }
    }
}

/// Validated PIX key pair; at least one is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixKeys {
    pub cpf: Option<String>,
    pub phone: Option<String>,
}

impl PixKeys {
    /// CPF: 11 digits, `.`/`-` separators allowed. Phone: 10 to 13 digits
    /// with an optional leading `+`, common separators allowed.
    pub fn parse(cpf: Option<&str>, phone: Option<&str>) -> Result<Self, ServiceError> {
        let cpf = cpf
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| {
                let digits: String = raw.chars().filter(|c| !matches!(c, '.' | '-')).collect();
                if digits.len() == 11 && digits.bytes().all(|b| b.is_ascii_digit()) {
                    Ok(digits)
                } else {
                    Err(ServiceError::Validation("pixCpf must have 11 digits".into()))
                }
            })
            .transpose()?;
        let phone = phone
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| {
                let compact: String = raw
                    .chars()
                    .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
                    .collect();
                let digits = compact.strip_prefix('+').unwrap_or(&compact);
                if (10..=13).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
                    Ok(compact)
                } else {
                    Err(ServiceError::Validation("pixPhone is not a valid phone number".into()))
                }
            })
            .transpose()?;
        if cpf.is_none() && phone.is_none() {
            return Err(ServiceError::Validation(
                "one of pixCpf or pixPhone is required".into(),
            ));
        }
        Ok(Self { cpf, phone })
    }
}

pub struct OrderService {
    store: Arc<dyn LedgerStore>,
    bus: EventBus,
    oracle: Arc<RateOracle>,
    allocator: AddressAllocator,
    pricing: PricingConfig,
    deposit_rules: DepositRules,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        bus: EventBus,
        oracle: Arc<RateOracle>,
        allocator: AddressAllocator,
        pricing: PricingConfig,
        deposit_rules: DepositRules,
    ) -> Self {
        Self {
            store,
            bus,
            oracle,
            allocator,
            pricing,
            deposit_rules,
        }
    }

    pub async fn current_rate(&self) -> Result<Decimal, ServiceError> {
        Ok(self.oracle.current().await?)
    }

    pub async fn ready(&self) -> Result<(), ServiceError> {
        Ok(self.store.ping().await?)
    }

    /// Create an off-ramp order waiting for its deposit.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, ServiceError> {
        let keys = PixKeys::parse(request.pix_cpf.as_deref(), request.pix_phone.as_deref())?;
        let network = Network::from(request.network);
        let rate = self.oracle.current().await?;
        let quote = quote(request.amount_brl, rate, &self.pricing)?;
        let supplied = request
            .address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|address| {
                normalize_tron_address(address)
                    .map_err(|_| ServiceError::Validation(format!("invalid {network} address")))
            })
            .transpose()?;

        let now = OffsetDateTime::now_utc();
        let mut new_order = NewOrder {
            id: Uuid::new_v4(),
            network,
            amount_brl: quote.amount_brl,
            fee_brl: quote.fee_brl,
            payout_brl: quote.payout_brl,
            crypto_amount: quote.crypto_amount,
            address: String::new(),
            derivation_index: None,
            rate_locked: quote.rate,
            rate_lock_expires_at: now + self.pricing.rate_lock,
            pix_cpf: keys.cpf,
            pix_phone: keys.phone,
            created_at: now,
        };

        let order = match supplied {
            Some(address) => {
                new_order.address = address;
                self.store.insert_order(new_order).await?
            }
            None => self.insert_with_derived_address(new_order).await?,
        };

        info!(
            order_id = %order.id,
            amount_brl = %order.amount_brl,
            crypto_amount = %order.crypto_amount,
            address = %order.address,
            "Order created"
        );
        self.bus.publish(SettlementEvent::OrderCreated {
            order_id: order.id,
            network: order.network,
        });
        Ok(order)
    }

    async fn insert_with_derived_address(&self, mut new_order: NewOrder) -> Result<Order, ServiceError> {
        if !self.allocator.is_configured() {
            return Err(ServiceError::NotConfigured("deposit address derivation"));
        }
        let mut last_conflict = None;
        for _ in 0..ALLOCATION_ATTEMPTS {
            let index = self.store.next_derivation_index().await?;
            new_order.address = self.allocator.derive(new_order.network, index)?;
            new_order.derivation_index = Some(index);
            match self.store.insert_order(new_order.clone()).await {
                Ok(order) => return Ok(order),
                Err(StoreError::Conflict(constraint)) => {
                    warn!(index, constraint = %constraint, "Derivation index taken, retrying");
                    last_conflict = Some(StoreError::Conflict(constraint));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_conflict
            .map(ServiceError::Store)
            .unwrap_or(ServiceError::NotConfigured("deposit address derivation")))
    }

    /// Create an on-ramp order waiting for its PIX charge.
    pub async fn create_buy_order(&self, request: CreateBuyOrderRequest) -> Result<BuyOrder, ServiceError> {
        let keys = PixKeys::parse(request.pix_cpf.as_deref(), request.pix_phone.as_deref())?;
        let network = Network::from(request.network);
        let dest_address = normalize_tron_address(request.dest_address.trim())
            .map_err(|_| ServiceError::Validation(format!("invalid {network} destination address")))?;
        let rate = self.oracle.current().await?;
        let quote = quote(request.amount_brl, rate, &self.pricing)?;

        let now = OffsetDateTime::now_utc();
        let order = self
            .store
            .insert_buy_order(NewBuyOrder {
                id: Uuid::new_v4(),
                network,
                amount_brl: quote.amount_brl,
                fee_brl: quote.fee_brl,
                crypto_amount: quote.crypto_amount,
                dest_address,
                rate_locked: quote.rate,
                rate_lock_expires_at: now + self.pricing.rate_lock,
                pix_cpf: keys.cpf,
                pix_phone: keys.phone,
                created_at: now,
            })
            .await?;
        info!(
            buy_order_id = %order.id,
            amount_brl = %order.amount_brl,
            crypto_amount = %order.crypto_amount,
            "Buy order created"
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.store
            .get_order(id)
            .await?
            .ok_or(ServiceError::NotFound("order"))
    }

    pub async fn get_buy_order(&self, id: Uuid) -> Result<BuyOrder, ServiceError> {
        self.store
            .get_buy_order(id)
            .await?
            .ok_or(ServiceError::NotFound("buy order"))
    }

    /// Apply a deposit reported by a trusted party. Confirmation depth is
    /// the caller's responsibility; everything else matches the chain scan.
    pub async fn record_deposit(
        &self,
        order_id: Uuid,
        notification: DepositNotification,
        idempotency_key: Option<&str>,
    ) -> Result<NotificationAck, ServiceError> {
        let scope = idempotency_key.map(|key| format!("deposit:{key}"));
        if let Some(ack) = self.replay(order_id, scope.as_deref()).await? {
            return Ok(ack);
        }
        let tx_hash = notification.tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(ServiceError::Validation("txHash is required".into()));
        }
        if notification.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation("amount must be positive".into()));
        }

        let order = self.get_order(order_id).await?;
        let outcome = settle_deposit(
            self.store.as_ref(),
            &self.bus,
            self.deposit_rules,
            &order,
            tx_hash,
            notification.amount,
            OffsetDateTime::now_utc(),
        )
        .await?;
        info!(order_id = %order_id, tx_hash, outcome = ?outcome, "Deposit notification applied");

        let current = self.get_order(order_id).await?;
        let ack = NotificationAck {
            ok: outcome != DepositOutcome::AlreadyHandled,
            order_id,
            status: current.status.into(),
        };
        self.remember(order_id, scope.as_deref(), &ack).await?;
        Ok(ack)
    }

    /// Record a payout result reported by a trusted party.
    pub async fn record_payout(
        &self,
        order_id: Uuid,
        notification: PayoutNotification,
        idempotency_key: Option<&str>,
    ) -> Result<NotificationAck, ServiceError> {
        let scope = idempotency_key.map(|key| format!("payout:{key}"));
        if let Some(ack) = self.replay(order_id, scope.as_deref()).await? {
            return Ok(ack);
        }
        let provider_id = notification.provider_id.trim();
        if provider_id.is_empty() {
            return Err(ServiceError::Validation("providerId is required".into()));
        }

        let order = self.get_order(order_id).await?;
        let target = payout_status(notification.status);
        let applied = if order.status == target && order.tx_hash.as_deref() == Some(provider_id) {
            false
        } else {
            let transition = Transition::new(order.status, target)?;
            self.settle_payout(
                &order,
                transition,
                provider_id,
                notification.status,
                notification.error,
            )
            .await?
        };

        let current = self.get_order(order_id).await?;
        let ack = NotificationAck {
            ok: applied || current.status == target,
            order_id,
            status: current.status.into(),
        };
        self.remember(order_id, scope.as_deref(), &ack).await?;
        Ok(ack)
    }

    /// Handle a PIX provider callback. A provider id is processed once per
    /// reference; later deliveries are acknowledged as duplicates.
    pub async fn handle_provider_webhook(&self, webhook: ProviderWebhook) -> Result<WebhookAck, ServiceError> {
        let reference = webhook.reference;
        if self
            .store
            .has_event(reference, ledger_event::PROVIDER_WEBHOOK, "providerId", &webhook.id)
            .await?
        {
            info!(reference = %reference, provider_id = %webhook.id, "Duplicate provider webhook");
            return Ok(WebhookAck {
                received: true,
                duplicate: true,
                applied: false,
            });
        }

        let applied = match webhook.status {
            ProviderStatus::Paid => self.apply_buy_paid(reference).await?,
            ProviderStatus::Completed => {
                self.apply_provider_payout(reference, &webhook.id, PayoutResult::Completed, webhook.error.clone())
                    .await?
            }
            ProviderStatus::Failed => {
                self.apply_provider_payout(reference, &webhook.id, PayoutResult::Failed, webhook.error.clone())
                    .await?
            }
        };
        if !applied {
            warn!(
                reference = %reference,
                provider_id = %webhook.id,
                status = ?webhook.status,
                "Provider webhook did not change any order"
            );
        }

        self.store
            .append_event(NewLedgerEvent::new(
                reference,
                ledger_event::PROVIDER_WEBHOOK,
                json!({
                    "providerId": webhook.id,
                    "status": webhook.status,
                    "error": webhook.error,
                    "applied": applied,
                }),
            ))
            .await?;

        Ok(WebhookAck {
            received: true,
            duplicate: false,
            applied,
        })
    }

    async fn apply_buy_paid(&self, id: Uuid) -> Result<bool, ServiceError> {
        let Some(order) = self.store.get_buy_order(id).await? else {
            return Ok(false);
        };
        let Ok(transition) = Transition::new(order.status, BuyOrderStatus::PixReceived) else {
            return Ok(false);
        };
        if !self
            .store
            .transition_buy_order(id, transition, BuyOrderPatch::default())
            .await?
        {
            return Ok(false);
        }
        info!(buy_order_id = %id, "Buy order PIX received");
        self.bus.publish(SettlementEvent::BuyOrderPaid { buy_order_id: id });
        Ok(true)
    }

    async fn apply_provider_payout(
        &self,
        id: Uuid,
        provider_id: &str,
        result: PayoutResult,
        error: Option<String>,
    ) -> Result<bool, ServiceError> {
        let Some(order) = self.store.get_order(id).await? else {
            return Ok(false);
        };
        let Ok(transition) = Transition::new(order.status, payout_status(result)) else {
            return Ok(false);
        };
        self.settle_payout(&order, transition, provider_id, result, error).await
    }

    async fn settle_payout(
        &self,
        order: &Order,
        transition: Transition<OrderStatus>,
        provider_id: &str,
        result: PayoutResult,
        error: Option<String>,
    ) -> Result<bool, ServiceError> {
        let patch = match result {
            PayoutResult::Completed => OrderPatch::settled(provider_id),
            PayoutResult::Failed => {
                let mut patch = OrderPatch::failed(error.unwrap_or_else(|| "payout failed".into()));
                patch.tx_hash = Some(provider_id.to_string());
                patch
            }
        };
        if !self.store.transition_order(order.id, transition, patch).await? {
            return Ok(false);
        }
        info!(order_id = %order.id, provider_id, status = transition.to().as_str(), "Payout result recorded");
        self.bus.publish(SettlementEvent::PayoutSettled {
            order_id: order.id,
            reference: provider_id.to_string(),
            result,
        });
        Ok(true)
    }

    async fn replay(&self, order_id: Uuid, scope: Option<&str>) -> Result<Option<NotificationAck>, ServiceError> {
        let Some(scope) = scope else {
            return Ok(None);
        };
        let Some(entry) = self
            .store
            .find_event(order_id, ledger_event::IDEMPOTENCY, "key", scope)
            .await?
        else {
            return Ok(None);
        };
        let ack = entry
            .payload
            .get("response")
            .cloned()
            .map(serde_json::from_value::<NotificationAck>)
            .transpose()
            .map_err(StoreError::from)?;
        Ok(ack)
    }

    async fn remember(&self, order_id: Uuid, scope: Option<&str>, ack: &NotificationAck) -> Result<(), ServiceError> {
        let Some(scope) = scope else {
            return Ok(());
        };
        let response = serde_json::to_value(ack).map_err(StoreError::from)?;
        self.store
            .append_event(NewLedgerEvent::new(
                order_id,
                ledger_event::IDEMPOTENCY,
                json!({ "key": scope, "response": response }),
            ))
            .await?;
        Ok(())
    }
}

fn payout_status(result: PayoutResult) -> OrderStatus {
    match result {
        PayoutResult::Completed => OrderStatus::Completed,
        PayoutResult::Failed => OrderStatus::Failed,
    }
}
