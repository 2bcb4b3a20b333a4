//! The deposit watcher: an explicit state machine that consumes blocks in
//! order, one at a time.
//!
//! ```text
//! Initializing ──► Polling(h) ──► block h+1 absent ──► idle wait ──► Polling(h)
//!                     │
//!                     ├─► block h+1 delivered ──► Committing(h+1) ──► Polling(h+1)
//!                     │
//!                     └─► ledger/sink error ──► backoff ──► Polling(h)
//! ```
//!
//! The cursor only moves after every event of a block reached the sink and
//! the new cursor was persisted. Errors never skip a height.

pub mod cursor;

use std::sync::Arc;
use std::time::Duration;

use depwatch_sdk::objects::DepositEvent;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::{ClassifyError, TransferClassifier};
use crate::guard::AttributionGuard;
use crate::ledger::{LedgerError, LedgerPort};
use crate::registry::AddressRegistry;
use crate::sink::{EventSink, SinkError};
use crate::utils::backoff::{BackoffPolicy, FixedBackoff};

pub use cursor::{Cursor, CursorError, CursorStore, MemoryCursorStore, PgCursorStore};

/// Where a watcher without a stored cursor begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Only blocks after the current head are watched.
    #[default]
    Head,
    /// Watch from this height on, inclusive. Height 0 is treated as 1.
    Height(u64),
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Key of this watcher's cursor in the store.
    pub watcher_id: String,
    /// Sleep when caught up with the chain head.
    pub poll_interval: Duration,
    /// Pause between two processed blocks while catching up.
    pub yield_delay: Duration,
    pub start: StartPosition,
    /// Upper bound for one sink call. `None` waits indefinitely.
    pub sink_timeout: Option<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watcher_id: "default".to_string(),
            poll_interval: Duration::from_secs(10),
            yield_delay: Duration::from_millis(100),
            start: StartPosition::Head,
            sink_timeout: None,
        }
    }
}

/// Errors that send the watcher into backoff.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("cursor store failed: {0}")]
    Cursor(#[from] CursorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Initializing,
    Polling(Cursor),
    /// Block `cursor.last_processed_height` was delivered but the cursor is
    /// not persisted yet.
    Committing { cursor: Cursor, delivered: usize },
}

/// Result of one state machine step.
#[derive(Debug)]
pub enum PollOutcome {
    Initialized { cursor: Cursor },
    Processed { height: u64, delivered: usize },
    NotYetAvailable { height: u64 },
    /// `attempt` counts consecutive failures, starting at 0.
    Backoff {
        height: Option<u64>,
        attempt: u32,
        error: WatchError,
    },
}

pub struct DepositWatcher<L, S, C>
where
    L: LedgerPort + ?Sized,
{
    ledger: Arc<L>,
    registry: Arc<AddressRegistry>,
    classifier: TransferClassifier,
    sink: S,
    store: C,
    backoff: Box<dyn BackoffPolicy>,
    config: WatcherConfig,
    state: WatcherState,
    failures: u32,
    cursor_tx: watch::Sender<Option<Cursor>>,
}

impl<L, S, C> DepositWatcher<L, S, C>
where
    L: LedgerPort + ?Sized,
    S: EventSink,
    C: CursorStore,
{
    /// Create a watcher retrying failures every `poll_interval`.
    pub fn new(
        ledger: Arc<L>,
        registry: Arc<AddressRegistry>,
        classifier: TransferClassifier,
        sink: S,
        store: C,
        config: WatcherConfig,
    ) -> Self {
        let (cursor_tx, _) = watch::channel(None);
        Self {
            ledger,
            registry,
            classifier,
            sink,
            store,
            backoff: Box::new(FixedBackoff(config.poll_interval)),
            config,
            state: WatcherState::Initializing,
            failures: 0,
            cursor_tx,
        }
    }

    pub fn with_backoff(mut self, backoff: Box<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn watcher_id(&self) -> &str {
        &self.config.watcher_id
    }

    /// Last committed cursor, `None` before initialization.
    pub fn cursor(&self) -> Option<Cursor> {
        *self.cursor_tx.borrow()
    }

    /// Follow the committed cursor from another task.
    pub fn subscribe_cursor(&self) -> watch::Receiver<Option<Cursor>> {
        self.cursor_tx.subscribe()
    }

    /// Run until `shutdown_rx` turns `true` or its sender is dropped.
    ///
    /// The signal is checked between steps and interrupts sleeps; a block in
    /// progress is always finished. Returns the last committed cursor.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Option<Cursor> {
        info!(watcher_id = %self.config.watcher_id, "DepositWatcher started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let outcome = self.poll_once().await;
            let delay = self.delay_for(&outcome);
            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }

        let cursor = self.cursor();
        info!(
            watcher_id = %self.config.watcher_id,
            last_processed_height = cursor.map(|c| c.last_processed_height),
            "DepositWatcher shutdown complete"
        );
        cursor
    }

    /// How long to wait after `outcome` before the next step.
    pub fn delay_for(&self, outcome: &PollOutcome) -> Duration {
        match outcome {
            PollOutcome::Initialized { .. } => Duration::ZERO,
            PollOutcome::Processed { .. } => self.config.yield_delay,
            PollOutcome::NotYetAvailable { .. } => self.config.poll_interval,
            PollOutcome::Backoff { attempt, .. } => self.backoff.delay(*attempt),
        }
    }

    /// Perform one state transition.
    pub async fn poll_once(&mut self) -> PollOutcome {
        match self.state {
            WatcherState::Initializing => match self.initialize().await {
                Ok(cursor) => {
                    self.failures = 0;
                    self.state = WatcherState::Polling(cursor);
                    self.cursor_tx.send_replace(Some(cursor));
                    PollOutcome::Initialized { cursor }
                }
                Err(e) => self.fail(None, e),
            },
            WatcherState::Polling(cursor) => {
                let height = cursor.next_height();
                match self.process_block(height).await {
                    Ok(None) => {
                        self.failures = 0;
                        debug!(height, "Block not yet available");
                        PollOutcome::NotYetAvailable { height }
                    }
                    Ok(Some(delivered)) => {
                        self.state = WatcherState::Committing {
                            cursor: cursor.advance(),
                            delivered,
                        };
                        self.commit(cursor.advance(), delivered).await
                    }
                    Err(e) => self.fail(Some(height), e),
                }
            }
            WatcherState::Committing { cursor, delivered } => self.commit(cursor, delivered).await,
        }
    }

    async fn initialize(&self) -> Result<Cursor, WatchError> {
        let watcher_id = &self.config.watcher_id;
        if let Some(cursor) = self.store.load(watcher_id).await? {
            info!(
                watcher_id = %watcher_id,
                last_processed_height = cursor.last_processed_height,
                "Resuming from stored cursor"
            );
            return Ok(cursor);
        }

        let cursor = match self.config.start {
            StartPosition::Head => Cursor::new(self.ledger.current_height().await?),
            StartPosition::Height(height) => Cursor::new(height.saturating_sub(1)),
        };
        self.store.save(watcher_id, cursor).await?;
        info!(
            watcher_id = %watcher_id,
            start = ?self.config.start,
            last_processed_height = cursor.last_processed_height,
            "Cursor initialized"
        );
        Ok(cursor)
    }

    /// Fetch, classify and deliver one block. `None` if it does not exist yet.
    async fn process_block(&self, height: u64) -> Result<Option<usize>, WatchError> {
        let Some(block) = self.ledger.get_block(height).await? else {
            return Ok(None);
        };
        if block.number != height {
            return Err(LedgerError::MalformedResponse(format!(
                "asked for block {height}, got {}",
                block.number
            ))
            .into());
        }

        let candidates = self
            .classifier
            .classify(self.ledger.as_ref(), &self.registry, &block)
            .await?;

        let mut guard = AttributionGuard::new(&self.registry);
        let mut delivered = 0;
        for candidate in candidates {
            let Some(event) = guard.admit(candidate, height) else {
                continue;
            };
            info!(
                height,
                user_id = %event.user_id,
                asset_kind = %event.asset_kind,
                amount = %event.amount,
                tx_hash = %event.tx_hash,
                log_index = event.log_index,
                "Deposit detected"
            );
            self.deliver(event).await?;
            delivered += 1;
        }
        Ok(Some(delivered))
    }

    async fn deliver(&self, event: DepositEvent) -> Result<(), SinkError> {
        match self.config.sink_timeout {
            Some(limit) => tokio::time::timeout(limit, self.sink.deliver(event))
                .await
                .map_err(|_| SinkError::Timeout(limit))?,
            None => self.sink.deliver(event).await,
        }
    }

    async fn commit(&mut self, cursor: Cursor, delivered: usize) -> PollOutcome {
        let height = cursor.last_processed_height;
        match self.store.save(&self.config.watcher_id, cursor).await {
            Ok(()) => {
                self.failures = 0;
                self.state = WatcherState::Polling(cursor);
                self.cursor_tx.send_replace(Some(cursor));
                debug!(height, delivered, "Block processed");
                PollOutcome::Processed { height, delivered }
            }
            Err(e) => self.fail(Some(height), e.into()),
        }
    }

    fn fail(&mut self, height: Option<u64>, error: WatchError) -> PollOutcome {
        let attempt = self.failures;
        self.failures = self.failures.saturating_add(1);
        warn!(
            watcher_id = %self.config.watcher_id,
            height = height,
            attempt,
            error = %error,
            "Watcher step failed, backing off"
        );
        PollOutcome::Backoff {
            height,
            attempt,
            error,
        }
    }
}
