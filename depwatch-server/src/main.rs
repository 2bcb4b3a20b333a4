//! depwatch server
//!
//! Watches a ledger for deposits to registered user addresses, records them,
//! notifies a webhook and exposes an admin API with payouts.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::{Parser, ValueEnum};
use config::file::{UserConfig, users_snippet};
use config::{ConfigLoader, PayoutSigner, get_database_url};
use depwatch_core::classifier::TransferClassifier;
use depwatch_core::events::deposit_recorded_channel;
use depwatch_core::framework::DatabaseProcessor;
use depwatch_core::ledger::JsonRpcLedger;
use depwatch_core::payout::{
    LocalSigner, NodeSigner, PayoutDispatcher, TransactionSigner, generate_wallet,
};
use depwatch_core::processors::{PgDepositSink, WebhookSender};
use depwatch_core::watcher::{DepositWatcher, PgCursorStore};
use depwatch_sdk::objects::UserId;
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// depwatch - deposit watcher and payout dispatcher
#[derive(Parser, Debug)]
#[command(name = "depwatch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./depwatch.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "DEPWATCH_LOG_FORMAT")]
    log_format: LogFormat,

    /// Generate a deposit keypair for USER_ID, print its `[[users]]` entry
    /// and private key, then exit
    #[arg(long, value_name = "USER_ID")]
    new_wallet: Option<String>,
}

/// Numeric ids stay numeric so they match integer ids already in the file.
fn parse_user_id(raw: &str) -> UserId {
    raw.parse::<i64>()
        .map(UserId::from)
        .unwrap_or_else(|_| UserId::from(raw))
}

fn print_new_wallet(raw_user_id: &str) -> anyhow::Result<()> {
    let wallet = generate_wallet(parse_user_id(raw_user_id));
    let snippet = users_snippet(vec![UserConfig::from(&wallet)])?;
    println!("{snippet}");
    println!("# private key for {}: {}", wallet.address, wallet.private_key.expose());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(user_id) = &args.new_wallet {
        return print_new_wallet(user_id);
    }

    init_tracing(args.log_format);

    tracing::info!("Starting depwatch-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        users = loaded.registry.len(),
        chain_id = loaded.chain.chain_id,
        token = loaded.chain.token.as_ref().map(|t| t.symbol.as_str()),
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

    let db = DatabaseProcessor::new(db_pool.clone());
    let ledger = Arc::new(JsonRpcLedger::new(loaded.rpc_url.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Deposit recording and webhook delivery
    let mut sink = PgDepositSink::new(db.clone());
    let webhook_handle = match loaded.webhook {
        Some(webhook) => {
            let (recorded_tx, recorded_rx) = deposit_recorded_channel();
            sink = sink.with_notifications(recorded_tx);
            let sender = WebhookSender::new(db.clone(), webhook, recorded_rx, shutdown_rx.clone());
            Some(tokio::spawn(sender.run()))
        }
        None => {
            tracing::warn!("No [webhook] section configured, deposits are only recorded");
            None
        }
    };

    // Deposit watcher
    let watcher = DepositWatcher::new(
        ledger.clone(),
        Arc::new(loaded.registry),
        TransferClassifier::new(loaded.chain.clone())?,
        sink,
        PgCursorStore::new(db.clone()),
        loaded.watcher,
    )
    .with_backoff(loaded.backoff);
    let watcher_id = watcher.watcher_id().to_owned();
    let cursor_rx = watcher.subscribe_cursor();
    let watcher_handle = tokio::spawn(watcher.run(shutdown_rx));

    // Payouts
    let payouts = match loaded.payout {
        Some(payout) => {
            let signer: Box<dyn TransactionSigner> = match payout {
                PayoutSigner::Node(custodial) => {
                    let address = custodial.to_evm().ok_or_else(|| {
                        anyhow::anyhow!("custodial address {custodial} is not a valid address")
                    })?;
                    Box::new(NodeSigner::new(ledger.clone(), address))
                }
                PayoutSigner::Local(key) => Box::new(LocalSigner::from_private_key(&key)?),
            };
            let dispatcher = PayoutDispatcher::new(ledger.clone(), signer, loaded.chain.clone());
            tracing::info!(custodial = %dispatcher.custodial_address(), "Payouts enabled");
            Some(dispatcher)
        }
        None => None,
    };

    let state = AppState::new(db_pool.clone(), loaded.admin, &watcher_id, cursor_rx, payouts);
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", loaded.listen);
    let result = run_server(router, loaded.listen).await;

    // Stop background processors
    let _ = shutdown_tx.send(true);
    match watcher_handle.await {
        Ok(cursor) => tracing::info!(
            last_processed_height = cursor.map(|c| c.last_processed_height),
            "Deposit watcher stopped"
        ),
        Err(e) => tracing::error!(error = %e, "Deposit watcher task failed"),
    }
    if let Some(handle) = webhook_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Webhook sender task failed");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
