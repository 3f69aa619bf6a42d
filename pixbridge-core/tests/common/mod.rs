#![allow(dead_code)]

use async_trait::async_trait;
use pixbridge_core::chain::{ChainClient, ChainError, TransferEvent, TransferPage};
use pixbridge_core::clients::{
    PixError, PixPayout, PixProvider, PriceError, PriceSource, Signer, SignerError,
    TransferRequest,
};
use pixbridge_core::entities::{
    Network, NewOrder, Order, OrderPatch, OrderStatus, Transition,
};
use pixbridge_core::store::{LedgerStore, MemoryLedger};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

pub const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
pub const ADDR_1: &str = "TN6E3GV39qx8MxqVpU2bdcd7qVJwqCvQUV";
pub const ADDR_2: &str = "TVfk2tQtKAPELbcXkmu9zhM4QG4RQqNodD";
pub const TREASURY: &str = "TRvS7Mk41ndmYWHQTAs4GLj3JwLHTwhSV4";
pub const CPF: &str = "12345678909";

// -- chain -------------------------------------------------------------------

/// Chain whose blocks hold pre-paged transfer lists.
pub struct FakeChain {
    head: AtomicI64,
    blocks: Mutex<HashMap<i64, Vec<Vec<TransferEvent>>>>,
    balances: Mutex<HashMap<String, u64>>,
    balance_unavailable: AtomicBool,
    pub requested_blocks: Mutex<Vec<i64>>,
}

impl FakeChain {
    pub fn new(head: i64) -> Self {
        Self {
            head: AtomicI64::new(head),
            blocks: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            balance_unavailable: AtomicBool::new(false),
            requested_blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_head(&self, head: i64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Append a page of transfers to `block`.
    pub fn add_page(&self, block: i64, transfers: Vec<TransferEvent>) {
        self.blocks
            .lock()
            .unwrap()
            .entry(block)
            .or_default()
            .push(transfers);
    }

    pub fn set_balance(&self, address: &str, sun: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), sun);
    }

    pub fn fail_balance_queries(&self, fail: bool) {
        self.balance_unavailable.store(fail, Ordering::SeqCst);
    }
}

pub fn transfer(tx_id: &str, block: i64, to: &str, raw_value: &str) -> TransferEvent {
    TransferEvent {
        tx_id: tx_id.to_string(),
        block_number: block,
        to: to.to_string(),
        raw_value: raw_value.to_string(),
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn network(&self) -> Network {
        Network::Tron
    }

    async fn latest_block(&self) -> Result<i64, ChainError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn transfer_events(
        &self,
        _contract: &str,
        block: i64,
        page: Option<&str>,
    ) -> Result<TransferPage, ChainError> {
        self.requested_blocks.lock().unwrap().push(block);
        let blocks = self.blocks.lock().unwrap();
        let Some(pages) = blocks.get(&block) else {
            return Ok(TransferPage::default());
        };
        let index: usize = match page {
            Some(p) => p.parse().map_err(|_| ChainError::Parse(p.to_string()))?,
            None => 0,
        };
        let events = pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < pages.len()).then(|| (index + 1).to_string());
        Ok(TransferPage { events, next })
    }

    async fn native_balance(&self, address: &str) -> Result<u64, ChainError> {
        if self.balance_unavailable.load(Ordering::SeqCst) {
            return Err(ChainError::Api {
                message: "node unavailable".into(),
            });
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0))
    }
}

// -- PIX provider ------------------------------------------------------------

pub struct FakePix {
    fail: AtomicBool,
    pub payouts: Mutex<Vec<PixPayout>>,
}

impl FakePix {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            payouts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let pix = Self::new();
        pix.fail.store(true, Ordering::SeqCst);
        pix
    }

    pub fn count(&self) -> usize {
        self.payouts.lock().unwrap().len()
    }
}

#[async_trait]
impl PixProvider for FakePix {
    async fn send_payout(&self, payout: &PixPayout) -> Result<String, PixError> {
        // widen the window between claim and settlement
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.payouts.lock().unwrap().push(payout.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PixError::Rejected {
                status: 422,
                body: "invalid key".into(),
            });
        }
        Ok(format!("E2E-{}", payout.reference))
    }
}

// -- signer ------------------------------------------------------------------

pub struct FakeSigner {
    fail: AtomicBool,
    pub requests: Mutex<Vec<TransferRequest>>,
}

impl FakeSigner {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let signer = Self::new();
        signer.fail.store(true, Ordering::SeqCst);
        signer
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Signer for FakeSigner {
    async fn transfer(&self, request: &TransferRequest) -> Result<String, SignerError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected {
                status: 500,
                body: "broadcast failed".into(),
            });
        }
        Ok(format!("tx-{}", request.idempotency_key))
    }
}

// -- price -------------------------------------------------------------------

pub struct FixedPrice(pub Decimal);

#[async_trait]
impl PriceSource for FixedPrice {
    async fn fetch_brl(&self) -> Result<Decimal, PriceError> {
        Ok(self.0)
    }
}

// -- fixtures ----------------------------------------------------------------

pub struct OrderFixture {
    pub crypto_amount: Decimal,
    pub address: String,
    pub derivation_index: Option<i32>,
    pub expires_in: time::Duration,
    pub cpf: Option<String>,
}

impl OrderFixture {
    pub fn new(crypto_amount: Decimal, address: &str) -> Self {
        Self {
            crypto_amount,
            address: address.to_string(),
            derivation_index: None,
            expires_in: time::Duration::minutes(10),
            cpf: Some(CPF.to_string()),
        }
    }

    pub fn derived(mut self, index: i32) -> Self {
        self.derivation_index = Some(index);
        self
    }

    pub fn expires_in(mut self, expires_in: time::Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub fn cpf(mut self, cpf: &str) -> Self {
        self.cpf = Some(cpf.to_string());
        self
    }
}

/// Insert an `aguardando_deposito` order quoted at 100 BRL.
pub async fn insert_order(store: &MemoryLedger, params: OrderFixture) -> Order {
    let now = OffsetDateTime::now_utc();
    store
        .insert_order(NewOrder {
            id: Uuid::new_v4(),
            network: Network::Tron,
            amount_brl: Decimal::from(100),
            fee_brl: Decimal::from(10),
            payout_brl: Decimal::from(90),
            crypto_amount: params.crypto_amount,
            address: params.address,
            derivation_index: params.derivation_index,
            rate_locked: Decimal::from(5),
            rate_lock_expires_at: now + params.expires_in,
            pix_cpf: params.cpf,
            pix_phone: None,
            created_at: now,
        })
        .await
        .unwrap()
}

/// Insert an order and move it to `pago` with a recorded deposit.
pub async fn insert_paid_order(store: &MemoryLedger, params: OrderFixture, deposit: Decimal) -> Order {
    let order = insert_order(store, params).await;
    let moved = store
        .transition_order(
            order.id,
            Transition::new(OrderStatus::AwaitingDeposit, OrderStatus::Paid).unwrap(),
            OrderPatch::deposit(format!("deposit-{}", order.id), deposit),
        )
        .await
        .unwrap();
    assert!(moved);
    store.get_order(order.id).await.unwrap().unwrap()
}

/// Insert an order and carry it all the way to `concluída`.
pub async fn insert_completed_order(store: &MemoryLedger, params: OrderFixture) -> Order {
    let order = insert_paid_order(store, params, Decimal::from(18)).await;
    store
        .transition_order(
            order.id,
            Transition::new(OrderStatus::Paid, OrderStatus::Completed).unwrap(),
            OrderPatch::settled("E2E-previous"),
        )
        .await
        .unwrap();
    store.get_order(order.id).await.unwrap().unwrap()
}
