//! PixBridge Server
//!
//! Settlement engine bridging PIX payments and USDT on TRON.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use anyhow::Context;
use clap::Parser;
use config::runtime::RuntimeConfig;
use config::{ConfigLoader, get_database_url};
use pixbridge_core::chain::{AddressAllocator, ChainClient, TronGridClient};
use pixbridge_core::clients::{
    CoinGeckoSource, HdSignerClient, PagBankClient, PixProvider, Signer,
};
use pixbridge_core::config::SweepMode;
use pixbridge_core::events::{EventBus, EventKind};
use pixbridge_core::oracle::RateOracle;
use pixbridge_core::processors::{
    BuySender, DepositRules, DepositWatcher, PayoutDispatcher, SweepConsolidator,
};
use pixbridge_core::service::OrderService;
use pixbridge_core::store::{LedgerStore, PgLedger};
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// PixBridge - PIX / USDT (TRC-20) settlement engine
#[derive(Parser, Debug)]
#[command(name = "pixbridge-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "PIXBRIDGE_CONFIG", default_value = "./pixbridge.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting pixbridge-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!(
        environment = ?config.environment,
        "Configuration loaded from {:?}",
        args.config
    );

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedger::new(db_pool.clone()));
    let bus = EventBus::new();
    let components = Components::build(&config, store, bus)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = components.spawn_workers(shutdown_rx);

    let state = AppState::new(components.service, config.secrets);
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", config.listen);
    let result = run_server(router, config.listen).await;

    tracing::info!("Stopping background workers...");
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("All workers already stopped");
    }
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Worker task failed");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Everything the workers and the HTTP layer share, wired from config.
struct Components {
    service: Arc<OrderService>,
    oracle: Arc<RateOracle>,
    watcher: Arc<DepositWatcher>,
    dispatcher: Arc<PayoutDispatcher>,
    buy_sender: Arc<BuySender>,
    sweeper: Option<Arc<SweepConsolidator>>,
    bus: EventBus,
}

impl Components {
    fn build(
        config: &RuntimeConfig,
        store: Arc<dyn LedgerStore>,
        bus: EventBus,
    ) -> anyhow::Result<Self> {
        let chain: Arc<dyn ChainClient> = Arc::new(
            TronGridClient::new(config.tron.full_node_url.clone(), config.tron.api_key.clone())
                .context("failed to build TronGrid client")?,
        );
        let allocator = AddressAllocator::new(config.tron.xpub.as_deref())
            .context("invalid tron.xpub")?;

        let price_source = CoinGeckoSource::new(config.price_source_url.clone())
            .context("failed to build price source client")?;
        let oracle = Arc::new(RateOracle::new(
            Arc::new(price_source),
            bus.clone(),
            config.oracle.clone(),
        ));

        let pix: Option<Arc<dyn PixProvider>> = match &config.pix {
            Some(access) => Some(Arc::new(
                PagBankClient::new(&access.base_url, access.token.clone())
                    .context("failed to build PIX provider client")?,
            )),
            None => None,
        };
        let signer: Option<Arc<dyn Signer>> = match &config.signer {
            Some(access) => Some(Arc::new(
                HdSignerClient::new(&access.url, access.hmac_secret.clone(), access.timeout)
                    .context("failed to build signer client")?,
            )),
            None => None,
        };

        let service = Arc::new(OrderService::new(
            store.clone(),
            bus.clone(),
            oracle.clone(),
            allocator.clone(),
            config.pricing.clone(),
            DepositRules::from(&config.watcher),
        ));
        let watcher = Arc::new(DepositWatcher::new(
            store.clone(),
            chain.clone(),
            bus.clone(),
            config.watcher.clone(),
        ));
        let dispatcher = Arc::new(PayoutDispatcher::new(
            store.clone(),
            bus.clone(),
            pix,
            config.payout.clone(),
        ));
        let buy_sender = Arc::new(BuySender::new(
            store.clone(),
            signer.clone(),
            config.buy_send.clone(),
        ));
        let sweeper = match &config.sweep {
            Some(sweep) => {
                let sweep_signer = match sweep.mode {
                    SweepMode::Live => signer,
                    SweepMode::Stub => None,
                };
                Some(Arc::new(
                    SweepConsolidator::new(store, chain, allocator, sweep_signer, sweep.clone())
                        .context("invalid sweep configuration")?,
                ))
            }
            None => {
                tracing::info!("Sweep consolidation disabled");
                None
            }
        };

        Ok(Self {
            service,
            oracle,
            watcher,
            dispatcher,
            buy_sender,
            sweeper,
            bus,
        })
    }

    /// Subscribe every worker before any of them runs, then spawn them.
    fn spawn_workers(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let order_created = self.bus.subscribe(EventKind::OrderCreated);
        let payout_requests = self.bus.subscribe(EventKind::PayoutRequested);
        let buy_paid = self.bus.subscribe(EventKind::BuyOrderPaid);

        let mut workers = vec![
            tokio::spawn(self.oracle.clone().run(shutdown_rx.clone())),
            tokio::spawn(
                self.watcher
                    .clone()
                    .run(order_created, shutdown_rx.clone()),
            ),
            tokio::spawn(
                self.dispatcher
                    .clone()
                    .run(payout_requests, shutdown_rx.clone()),
            ),
            tokio::spawn(self.buy_sender.clone().run(buy_paid, shutdown_rx.clone())),
        ];
        if let Some(sweeper) = &self.sweeper {
            workers.push(tokio::spawn(sweeper.clone().run(shutdown_rx)));
        }
        tracing::info!(count = workers.len(), "Background workers started");
        workers
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
