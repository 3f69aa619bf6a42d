mod common;

use common::*;
use kanau::processor::Processor;
use pixbridge_core::chain::AddressAllocator;
use pixbridge_core::clients::{PixProvider, Signer};
use pixbridge_core::config::{BuySendConfig, OracleConfig, PayoutConfig, PricingConfig, WatcherConfig};
use pixbridge_core::entities::{BuyOrderStatus, Lifecycle, OrderStatus, ledger_event};
use pixbridge_core::events::{EventBus, EventKind, SettlementEvent};
use pixbridge_core::oracle::RateOracle;
use pixbridge_core::processors::{
    BuyOrderPaid, BuySendOutcome, BuySender, DepositRules, DepositWatcher, PayoutDispatcher,
    PayoutOutcome, PayoutRequest,
};
use pixbridge_core::service::{OrderService, ServiceError};
use pixbridge_core::store::{LedgerStore, MemoryLedger};
use pixbridge_sdk::objects::{
    CreateBuyOrderRequest, CreateOrderRequest, DepositNotification, Network as SdkNetwork,
    OrderStatus as SdkOrderStatus, PayoutNotification, PayoutResult, ProviderStatus,
    ProviderWebhook, WebhookAck,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    store: MemoryLedger,
    bus: EventBus,
    service: OrderService,
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig {
        lookback_blocks: 5,
        new_payee_hold: time::Duration::ZERO,
        ..Default::default()
    }
}

fn harness(xpub: Option<&str>) -> Harness {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let oracle = Arc::new(RateOracle::new(
        Arc::new(FixedPrice(dec!(5.0))),
        bus.clone(),
        OracleConfig::default(),
    ));
    let service = OrderService::new(
        Arc::new(store.clone()),
        bus.clone(),
        oracle,
        AddressAllocator::new(xpub).unwrap(),
        PricingConfig::default(),
        DepositRules::from(&watcher_config()),
    );
    Harness { store, bus, service }
}

fn order_request(amount: rust_decimal::Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        amount_brl: amount,
        address: None,
        network: SdkNetwork::Tron,
        pix_cpf: Some("123.456.789-09".into()),
        pix_phone: None,
    }
}

fn buy_request() -> CreateBuyOrderRequest {
    CreateBuyOrderRequest {
        amount_brl: dec!(100),
        dest_address: TREASURY.into(),
        network: SdkNetwork::Tron,
        pix_cpf: None,
        pix_phone: Some("+55 11 98765-4321".into()),
    }
}

#[tokio::test]
async fn create_order_quotes_and_derives_sequential_addresses() {
    let h = harness(Some(XPUB));
    let mut created = h.bus.subscribe(EventKind::OrderCreated);

    let first = h.service.create_order(order_request(dec!(100))).await.unwrap();
    assert_eq!(first.status, OrderStatus::AwaitingDeposit);
    assert_eq!(first.fee_brl, dec!(10));
    assert_eq!(first.payout_brl, dec!(90));
    assert_eq!(first.crypto_amount, dec!(18));
    assert_eq!(first.rate_locked, dec!(5));
    assert_eq!(first.derivation_index, Some(1));
    assert_eq!(first.address, ADDR_1);
    assert_eq!(first.pix_cpf.as_deref(), Some(CPF));
    assert_eq!(
        first.rate_lock_expires_at - first.created_at,
        time::Duration::seconds(600)
    );

    let second = h.service.create_order(order_request(dec!(100))).await.unwrap();
    assert_eq!(second.derivation_index, Some(2));
    assert_eq!(second.address, ADDR_2);

    assert!(matches!(
        created.recv().await,
        Some(SettlementEvent::OrderCreated { order_id, .. }) if order_id == first.id
    ));
    assert!(
        h.store
            .events_for(first.id)
            .await
            .iter()
            .any(|e| e.kind == ledger_event::ORDER_CREATED)
    );
}

#[tokio::test]
async fn create_order_validates_input() {
    let h = harness(None);

    let mut no_keys = order_request(dec!(100));
    no_keys.pix_cpf = None;
    assert!(matches!(
        h.service.create_order(no_keys).await,
        Err(ServiceError::Validation(_))
    ));

    let mut bad_address = order_request(dec!(100));
    bad_address.address = Some("0xnot-an-address".into());
    assert!(matches!(
        h.service.create_order(bad_address).await,
        Err(ServiceError::Validation(_))
    ));

    assert!(matches!(
        h.service.create_order(order_request(dec!(5))).await,
        Err(ServiceError::Quote(_))
    ));

    // no xpub and no client address
    assert!(matches!(
        h.service.create_order(order_request(dec!(100))).await,
        Err(ServiceError::NotConfigured(_))
    ));

    let mut supplied = order_request(dec!(100));
    supplied.address = Some("41a614f803b6fd780986a42c78ec9c7f77e6ded13c".into());
    let order = h.service.create_order(supplied).await.unwrap();
    assert_eq!(order.address, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t");
    assert_eq!(order.derivation_index, None);
}

#[tokio::test]
async fn deposit_notification_is_idempotent() {
    let h = harness(Some(XPUB));
    let order = h.service.create_order(order_request(dec!(100))).await.unwrap();
    let notification = DepositNotification {
        tx_hash: "tx-manual".into(),
        amount: dec!(18),
    };

    let first = h
        .service
        .record_deposit(order.id, notification.clone(), Some("key-1"))
        .await
        .unwrap();
    assert!(first.ok);
    assert_eq!(first.status, SdkOrderStatus::Paid);

    let replay = h
        .service
        .record_deposit(order.id, notification.clone(), Some("key-1"))
        .await
        .unwrap();
    assert_eq!(replay, first);

    // without a key the ledger still refuses to count the transaction twice
    let again = h
        .service
        .record_deposit(order.id, notification, None)
        .await
        .unwrap();
    assert_eq!(again.status, SdkOrderStatus::Paid);

    let events = h.store.events_for(order.id).await;
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == OrderStatus::Paid.event_type())
            .count(),
        1
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == ledger_event::IDEMPOTENCY)
            .count(),
        1
    );

    let other = h
        .service
        .record_deposit(
            order.id,
            DepositNotification {
                tx_hash: "tx-other".into(),
                amount: dec!(18),
            },
            None,
        )
        .await;
    assert!(matches!(other, Err(ServiceError::InvalidTransition(_))));

    assert!(matches!(
        h.service
            .record_deposit(
                Uuid::new_v4(),
                DepositNotification {
                    tx_hash: "tx".into(),
                    amount: dec!(1),
                },
                None
            )
            .await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn payout_notification_settles_paid_order() {
    let h = harness(Some(XPUB));
    let mut settled = h.bus.subscribe(EventKind::PayoutSettled);
    let order = insert_paid_order(&h.store, OrderFixture::new(dec!(18), ADDR_1), dec!(18)).await;
    let notification = PayoutNotification {
        provider_id: "E2E-manual".into(),
        status: PayoutResult::Completed,
        error: None,
    };

    let ack = h
        .service
        .record_payout(order.id, notification.clone(), None)
        .await
        .unwrap();
    assert!(ack.ok);
    assert_eq!(ack.status, SdkOrderStatus::Completed);
    assert!(matches!(
        settled.recv().await,
        Some(SettlementEvent::PayoutSettled { result: PayoutResult::Completed, .. })
    ));

    // same report again is harmless
    let again = h.service.record_payout(order.id, notification, None).await.unwrap();
    assert!(again.ok);

    let contradicting = h
        .service
        .record_payout(
            order.id,
            PayoutNotification {
                provider_id: "E2E-manual".into(),
                status: PayoutResult::Failed,
                error: Some("late failure".into()),
            },
            None,
        )
        .await;
    assert!(matches!(contradicting, Err(ServiceError::InvalidTransition(_))));
}

#[tokio::test]
async fn provider_webhook_is_processed_once() {
    let h = harness(Some(XPUB));
    let order = insert_paid_order(&h.store, OrderFixture::new(dec!(18), ADDR_1), dec!(18)).await;
    let webhook = ProviderWebhook {
        id: "pb-1".into(),
        reference: order.id,
        status: ProviderStatus::Completed,
        error: None,
    };

    let ack = h.service.handle_provider_webhook(webhook.clone()).await.unwrap();
    assert_eq!(
        ack,
        WebhookAck {
            received: true,
            duplicate: false,
            applied: true,
        }
    );
    let done = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.tx_hash.as_deref(), Some("pb-1"));

    let dup = h.service.handle_provider_webhook(webhook).await.unwrap();
    assert_eq!(
        dup,
        WebhookAck {
            received: true,
            duplicate: true,
            applied: false,
        }
    );

    // a new provider id that no longer applies is recorded but not applied
    let late = h
        .service
        .handle_provider_webhook(ProviderWebhook {
            id: "pb-2".into(),
            reference: order.id,
            status: ProviderStatus::Failed,
            error: Some("reversed".into()),
        })
        .await
        .unwrap();
    assert!(!late.duplicate);
    assert!(!late.applied);
    assert_eq!(
        h.store.get_order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Completed
    );
    assert_eq!(
        h.store
            .events_for(order.id)
            .await
            .iter()
            .filter(|e| e.kind == ledger_event::PROVIDER_WEBHOOK)
            .count(),
        2
    );
}

#[tokio::test]
async fn paid_buy_order_is_delivered_on_chain() {
    let h = harness(Some(XPUB));
    let mut paid = h.bus.subscribe(EventKind::BuyOrderPaid);
    let buy = h.service.create_buy_order(buy_request()).await.unwrap();
    assert_eq!(buy.status, BuyOrderStatus::AwaitingPix);
    assert_eq!(buy.crypto_amount, dec!(18));

    let ack = h
        .service
        .handle_provider_webhook(ProviderWebhook {
            id: "charge-1".into(),
            reference: buy.id,
            status: ProviderStatus::Paid,
            error: None,
        })
        .await
        .unwrap();
    assert!(ack.applied);
    assert_eq!(
        paid.recv().await,
        Some(SettlementEvent::BuyOrderPaid { buy_order_id: buy.id })
    );

    let signer = Arc::new(FakeSigner::new());
    let sender = BuySender::new(
        Arc::new(h.store.clone()),
        Some(signer.clone() as Arc<dyn Signer>),
        BuySendConfig::default(),
    );
    let outcome = sender
        .process(BuyOrderPaid { buy_order_id: buy.id })
        .await
        .unwrap();
    let tx_hash = format!("tx-buy-{}", buy.id);
    assert_eq!(outcome, BuySendOutcome::Sent { tx_hash: tx_hash.clone() });

    let request = signer.requests.lock().unwrap()[0].clone();
    assert_eq!(request.derivation_index, 0);
    assert_eq!(request.to, TREASURY);
    assert_eq!(request.amount, "18");

    let done = h.store.get_buy_order(buy.id).await.unwrap().unwrap();
    assert_eq!(done.status, BuyOrderStatus::Completed);
    assert_eq!(done.tx_hash_out, Some(tx_hash));

    // a second delivery attempt finds nothing to do
    assert_eq!(
        sender.process(BuyOrderPaid { buy_order_id: buy.id }).await.unwrap(),
        BuySendOutcome::Skipped
    );
    assert_eq!(signer.count(), 1);
}

#[tokio::test]
async fn buy_order_without_signer_waits_and_failures_are_recorded() {
    let h = harness(Some(XPUB));
    let buy = h.service.create_buy_order(buy_request()).await.unwrap();
    h.service
        .handle_provider_webhook(ProviderWebhook {
            id: "charge-1".into(),
            reference: buy.id,
            status: ProviderStatus::Paid,
            error: None,
        })
        .await
        .unwrap();

    let unconfigured = BuySender::new(Arc::new(h.store.clone()), None, BuySendConfig::default());
    assert_eq!(
        unconfigured
            .process(BuyOrderPaid { buy_order_id: buy.id })
            .await
            .unwrap(),
        BuySendOutcome::NotConfigured
    );
    assert_eq!(
        h.store.get_buy_order(buy.id).await.unwrap().unwrap().status,
        BuyOrderStatus::PixReceived
    );

    let failing = BuySender::new(
        Arc::new(h.store.clone()),
        Some(Arc::new(FakeSigner::failing()) as Arc<dyn Signer>),
        BuySendConfig::default(),
    );
    let outcome = failing
        .process(BuyOrderPaid { buy_order_id: buy.id })
        .await
        .unwrap();
    assert!(matches!(outcome, BuySendOutcome::Failed { .. }));
    let failed = h.store.get_buy_order(buy.id).await.unwrap().unwrap();
    assert_eq!(failed.status, BuyOrderStatus::Failed);
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn paid_buy_order_with_lost_event_is_sent_by_the_pass() {
    let h = harness(Some(XPUB));
    let buy = h.service.create_buy_order(buy_request()).await.unwrap();
    // nobody subscribed, so the BuyOrderPaid event goes nowhere
    h.service
        .handle_provider_webhook(ProviderWebhook {
            id: "charge-1".into(),
            reference: buy.id,
            status: ProviderStatus::Paid,
            error: None,
        })
        .await
        .unwrap();
    assert_eq!(h.store.buy_orders_awaiting_send().await.unwrap().len(), 1);

    let signer = Arc::new(FakeSigner::new());
    let sender = BuySender::new(
        Arc::new(h.store.clone()),
        Some(signer.clone() as Arc<dyn Signer>),
        BuySendConfig::default(),
    );
    assert_eq!(sender.send_due().await.unwrap(), 1);

    let done = h.store.get_buy_order(buy.id).await.unwrap().unwrap();
    assert_eq!(done.status, BuyOrderStatus::Completed);
    assert_eq!(signer.requests.lock().unwrap()[0].idempotency_key, format!("buy-{}", buy.id));

    // nothing left for the next pass
    assert_eq!(sender.send_due().await.unwrap(), 0);
    assert!(h.store.buy_orders_awaiting_send().await.unwrap().is_empty());
    assert_eq!(signer.count(), 1);
}

#[tokio::test]
async fn off_ramp_end_to_end() {
    let h = harness(Some(XPUB));
    let chain = Arc::new(FakeChain::new(200));
    let pix = Arc::new(FakePix::new());
    let watcher = DepositWatcher::new(
        Arc::new(h.store.clone()),
        chain.clone(),
        h.bus.clone(),
        watcher_config(),
    );
    let dispatcher = PayoutDispatcher::new(
        Arc::new(h.store.clone()),
        h.bus.clone(),
        Some(pix.clone() as Arc<dyn PixProvider>),
        PayoutConfig::default(),
    );
    let mut requested = h.bus.subscribe(EventKind::PayoutRequested);

    let good = h.service.create_order(order_request(dec!(100))).await.unwrap();
    let short = h.service.create_order(order_request(dec!(100))).await.unwrap();
    chain.add_page(180, vec![
        transfer("tx-good", 180, &good.address, "18100000"),
        transfer("tx-short", 180, &short.address, "10000000"),
    ]);

    let report = watcher.scan().await.unwrap();
    assert_eq!(report.paid, 1);
    assert_eq!(report.out_of_tolerance, 1);
    assert_eq!(
        h.store.get_order(short.id).await.unwrap().unwrap().status,
        OrderStatus::AwaitingReview
    );

    let Some(SettlementEvent::PayoutRequested { order_id }) = requested.recv().await else {
        panic!("expected a payout request");
    };
    assert_eq!(order_id, good.id);
    let outcome = dispatcher.process(PayoutRequest { order_id }).await.unwrap();
    assert!(matches!(outcome, PayoutOutcome::Settled { .. }));

    let done = h.service.get_order(good.id).await.unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.deposit_amount, Some(dec!(18.1)));
    assert_eq!(pix.payouts.lock().unwrap()[0].amount_brl, dec!(90));
}
