//! Application state shared across all request handlers.

use depwatch_core::config::AdminConfig;
use depwatch_core::ledger::JsonRpcLedger;
use depwatch_core::payout::{PayoutDispatcher, TransactionSigner};
use depwatch_core::watcher::Cursor;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::watch;

/// The payout dispatcher as wired by the server; the signer is picked by
/// the `[payout]` section.
pub type Payouts = PayoutDispatcher<JsonRpcLedger, Box<dyn TransactionSigner>>;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    pub admin: Arc<AdminConfig>,
    pub watcher_id: Arc<str>,
    /// Latest committed cursor of the running watcher.
    pub cursor_rx: watch::Receiver<Option<Cursor>>,
    /// `None` when no `[payout]` section is configured.
    pub payouts: Option<Arc<Payouts>>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        admin: AdminConfig,
        watcher_id: &str,
        cursor_rx: watch::Receiver<Option<Cursor>>,
        payouts: Option<Payouts>,
    ) -> Self {
        Self {
            db,
            admin: Arc::new(admin),
            watcher_id: Arc::from(watcher_id),
            cursor_rx,
            payouts: payouts.map(Arc::new),
        }
    }
}
