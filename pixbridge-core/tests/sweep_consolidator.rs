mod common;

use common::*;
use pixbridge_core::chain::AddressAllocator;
use pixbridge_core::clients::Signer;
use pixbridge_core::config::{SUN_PER_TRX, SweepConfig, SweepMode};
use pixbridge_core::entities::SweepStatus;
use pixbridge_core::processors::{SweepConsolidator, SweepError, SweepReport};
use pixbridge_core::store::MemoryLedger;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn config(mode: SweepMode) -> SweepConfig {
    SweepConfig {
        mode,
        treasury_address: TREASURY.to_string(),
        ..Default::default()
    }
}

fn consolidator(
    store: &MemoryLedger,
    chain: &Arc<FakeChain>,
    signer: Option<Arc<FakeSigner>>,
    mode: SweepMode,
) -> Result<SweepConsolidator, SweepError> {
    SweepConsolidator::new(
        Arc::new(store.clone()),
        chain.clone(),
        AddressAllocator::new(Some(XPUB)).unwrap(),
        signer.map(|s| s as Arc<dyn Signer>),
        config(mode),
    )
}

#[tokio::test]
async fn sweeps_each_paid_order_once() {
    let store = MemoryLedger::new();
    let chain = Arc::new(FakeChain::new(100));
    chain.set_balance(ADDR_1, 20 * SUN_PER_TRX);
    let signer = Arc::new(FakeSigner::new());
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1).derived(1), dec!(18.1)).await;
    let sweeper = consolidator(&store, &chain, Some(signer.clone()), SweepMode::Live).unwrap();

    let report = sweeper.cycle().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            created: 1,
            sent: 1,
            ..Default::default()
        }
    );

    let sweeps = store.sweeps_for(order.id).await;
    assert_eq!(sweeps.len(), 1);
    let sweep = &sweeps[0];
    assert_eq!(sweep.status, SweepStatus::Sent);
    assert_eq!(sweep.from_addr, ADDR_1);
    assert_eq!(sweep.to_addr, TREASURY);
    assert_eq!(sweep.tx_hash.as_deref(), Some(format!("tx-sweep-{}", sweep.id).as_str()));

    let request = signer.requests.lock().unwrap()[0].clone();
    assert_eq!(request.derivation_index, 1);
    assert_eq!(request.amount, "18.1");
    assert_eq!(request.idempotency_key, format!("sweep-{}", sweep.id));

    assert_eq!(sweeper.cycle().await.unwrap(), SweepReport::default());
    assert_eq!(store.sweeps_for(order.id).await.len(), 1);
    assert_eq!(signer.count(), 1);
}

#[tokio::test]
async fn insufficient_gas_defers_until_funded() {
    let store = MemoryLedger::new();
    let chain = Arc::new(FakeChain::new(100));
    chain.set_balance(ADDR_1, SUN_PER_TRX);
    let signer = Arc::new(FakeSigner::new());
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1).derived(1), dec!(18)).await;
    let sweeper = consolidator(&store, &chain, Some(signer.clone()), SweepMode::Live).unwrap();

    let report = sweeper.cycle().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(signer.count(), 0);
    assert_eq!(store.sweeps_for(order.id).await[0].status, SweepStatus::Pending);

    chain.fail_balance_queries(true);
    assert_eq!(sweeper.cycle().await.unwrap().deferred, 1);
    assert_eq!(signer.count(), 0);

    chain.fail_balance_queries(false);
    chain.set_balance(ADDR_1, 15 * SUN_PER_TRX);
    assert_eq!(sweeper.cycle().await.unwrap().sent, 1);
    assert_eq!(store.sweeps_for(order.id).await[0].status, SweepStatus::Sent);
}

#[tokio::test]
async fn failed_sweep_is_not_recreated() {
    let store = MemoryLedger::new();
    let chain = Arc::new(FakeChain::new(100));
    chain.set_balance(ADDR_2, 20 * SUN_PER_TRX);
    let signer = Arc::new(FakeSigner::failing());
    let order = insert_paid_order(&store, OrderFixture::new(dec!(20), ADDR_2).derived(2), dec!(20)).await;
    let sweeper = consolidator(&store, &chain, Some(signer.clone()), SweepMode::Live).unwrap();

    assert_eq!(sweeper.cycle().await.unwrap().failed, 1);
    assert_eq!(store.sweeps_for(order.id).await[0].status, SweepStatus::Failed);

    assert_eq!(sweeper.cycle().await.unwrap(), SweepReport::default());
    assert_eq!(store.sweeps_for(order.id).await.len(), 1);
    assert_eq!(signer.count(), 1);
}

#[tokio::test]
async fn orders_without_derived_address_are_skipped() {
    let store = MemoryLedger::new();
    let chain = Arc::new(FakeChain::new(100));
    let signer = Arc::new(FakeSigner::new());
    insert_paid_order(&store, OrderFixture::new(dec!(18), TREASURY), dec!(18)).await;
    insert_order(&store, OrderFixture::new(dec!(18), ADDR_1).derived(1)).await;
    let sweeper = consolidator(&store, &chain, Some(signer), SweepMode::Live).unwrap();

    assert_eq!(sweeper.cycle().await.unwrap(), SweepReport::default());
}

#[tokio::test]
async fn stub_mode_marks_sent_without_moving_funds() {
    let store = MemoryLedger::new();
    let chain = Arc::new(FakeChain::new(100));
    let order = insert_paid_order(&store, OrderFixture::new(dec!(18), ADDR_1).derived(1), dec!(18)).await;
    let sweeper = consolidator(&store, &chain, None, SweepMode::Stub).unwrap();

    let report = sweeper.cycle().await.unwrap();
    assert_eq!(report.sent, 1);
    let sweep = &store.sweeps_for(order.id).await[0];
    assert_eq!(sweep.status, SweepStatus::Sent);
    assert_eq!(sweep.tx_hash, Some(format!("sweep-sim-{}", sweep.id)));
}

#[tokio::test]
async fn mode_and_signer_must_agree() {
    let store = MemoryLedger::new();
    let chain = Arc::new(FakeChain::new(100));
    assert!(matches!(
        consolidator(&store, &chain, Some(Arc::new(FakeSigner::new())), SweepMode::Stub),
        Err(SweepError::StubWithSigner)
    ));
    assert!(matches!(
        consolidator(&store, &chain, None, SweepMode::Live),
        Err(SweepError::SignerMissing)
    ));
}
