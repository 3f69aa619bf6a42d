mod common;

use common::*;
use kanau::processor::Processor;
use pixbridge_core::config::PayoutConfig;
use pixbridge_core::entities::{OrderPatch, OrderStatus};
use pixbridge_core::events::{EventBus, EventKind, SettlementEvent};
use pixbridge_core::processors::{PayoutDispatcher, PayoutOutcome, PayoutRequest, SkipReason};
use pixbridge_core::store::{LedgerStore, MemoryLedger};
use pixbridge_sdk::objects::PayoutResult;
use rust_decimal_macros::dec;
use std::sync::Arc;
use time::OffsetDateTime;

fn dispatcher(store: &MemoryLedger, bus: &EventBus, pix: Option<Arc<FakePix>>) -> PayoutDispatcher {
    PayoutDispatcher::new(
        Arc::new(store.clone()),
        bus.clone(),
        pix.map(|p| p as Arc<dyn pixbridge_core::clients::PixProvider>),
        PayoutConfig::default(),
    )
}

#[tokio::test]
async fn successful_payout_completes_order() {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let mut settled = bus.subscribe(EventKind::PayoutSettled);
    let pix = Arc::new(FakePix::new());
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1), dec!(18)).await;

    let outcome = dispatcher(&store, &bus, Some(pix.clone()))
        .process(PayoutRequest { order_id: order.id })
        .await
        .unwrap();
    let reference = format!("E2E-{}", order.id);
    assert_eq!(outcome, PayoutOutcome::Settled { reference: reference.clone() });

    let payouts = pix.payouts.lock().unwrap().clone();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].amount_brl, dec!(90));
    assert_eq!(payouts[0].key, CPF);
    assert_eq!(payouts[0].reference, order.id);

    let done = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.tx_hash.as_deref(), Some(reference.as_str()));
    assert!(done.payout_claimed_at.is_some());

    assert_eq!(
        settled.recv().await,
        Some(SettlementEvent::PayoutSettled {
            order_id: order.id,
            reference,
            result: PayoutResult::Completed,
        })
    );
}

#[tokio::test]
async fn provider_failure_marks_order_failed() {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let mut settled = bus.subscribe(EventKind::PayoutSettled);
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1), dec!(18)).await;

    let outcome = dispatcher(&store, &bus, Some(Arc::new(FakePix::failing())))
        .process(PayoutRequest { order_id: order.id })
        .await
        .unwrap();
    assert!(matches!(outcome, PayoutOutcome::Failed { .. }));

    let failed = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(failed.status, OrderStatus::Failed);
    assert!(failed.error.unwrap().contains("422"));
    assert!(matches!(
        settled.recv().await,
        Some(SettlementEvent::PayoutSettled {
            result: PayoutResult::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn missing_provider_simulates_payout() {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1), dec!(18)).await;

    let outcome = dispatcher(&store, &bus, None)
        .process(PayoutRequest { order_id: order.id })
        .await
        .unwrap();
    let reference = format!("pix-sim-{}", order.id);
    assert_eq!(outcome, PayoutOutcome::Simulated { reference: reference.clone() });

    let done = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.tx_hash, Some(reference));
}

#[tokio::test]
async fn concurrent_requests_pay_once() {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let pix = Arc::new(FakePix::new());
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1), dec!(18)).await;
    let dispatcher = dispatcher(&store, &bus, Some(pix.clone()));

    let request = PayoutRequest { order_id: order.id };
    let (a, b) = tokio::join!(dispatcher.process(request), dispatcher.process(request));
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, PayoutOutcome::Settled { .. }))
            .count(),
        1
    );
    assert_eq!(pix.count(), 1);

    let again = dispatcher.process(request).await.unwrap();
    assert_eq!(
        again,
        PayoutOutcome::Skipped(SkipReason::NotPaid(OrderStatus::Completed))
    );
    assert_eq!(pix.count(), 1);
}

#[tokio::test]
async fn held_payout_waits_for_periodic_pass() {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let pix = Arc::new(FakePix::new());
    let held = insert_order(&store, OrderFixture::new(dec!(18), ADDR_1)).await;
    store
        .transition_order(
            held.id,
            pixbridge_core::entities::Transition::new(OrderStatus::AwaitingDeposit, OrderStatus::Paid)
                .unwrap(),
            OrderPatch::deposit("tx-held", dec!(18))
                .hold_until(Some(OffsetDateTime::now_utc() + time::Duration::minutes(30))),
        )
        .await
        .unwrap();
    let due = insert_paid_order(&store, OrderFixture::new(dec!(20), ADDR_2), dec!(20)).await;
    let dispatcher = dispatcher(&store, &bus, Some(pix.clone()));

    assert_eq!(
        dispatcher
            .process(PayoutRequest { order_id: held.id })
            .await
            .unwrap(),
        PayoutOutcome::Skipped(SkipReason::Held)
    );

    assert_eq!(dispatcher.sweep_due().await.unwrap(), 1);
    assert_eq!(pix.count(), 1);
    assert_eq!(
        store.get_order(due.id).await.unwrap().unwrap().status,
        OrderStatus::Completed
    );
    assert_eq!(
        store.get_order(held.id).await.unwrap().unwrap().status,
        OrderStatus::Paid
    );
}

#[tokio::test]
async fn unpaid_order_is_not_paid_out() {
    let store = MemoryLedger::new();
    let bus = EventBus::new();
    let pix = Arc::new(FakePix::new());
    let order = insert_order(&store, OrderFixture::new(dec!(18), ADDR_1)).await;

    let outcome = dispatcher(&store, &bus, Some(pix.clone()))
        .process(PayoutRequest { order_id: order.id })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PayoutOutcome::Skipped(SkipReason::NotPaid(OrderStatus::AwaitingDeposit))
    );
    assert_eq!(pix.count(), 0);
}
