//! Postgres-backed event sink.

use async_trait::async_trait;
use depwatch_sdk::objects::DepositEvent;
use kanau::processor::Processor;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::entities::deposit_event::{DepositEventInsert, InsertDepositEvent};
use crate::events::{DepositRecorded, DepositRecordedSender};
use crate::framework::DatabaseProcessor;
use crate::sink::{EventSink, SinkError};

/// Records every delivered event in `deposit_events`.
///
/// Replayed events hit the `(tx_hash, log_index)` unique key and are
/// absorbed without a second notification.
pub struct PgDepositSink {
    db: DatabaseProcessor,
    notify: Option<DepositRecordedSender>,
}

impl PgDepositSink {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db, notify: None }
    }

    /// Announce newly inserted rows on `notify`.
    pub fn with_notifications(mut self, notify: DepositRecordedSender) -> Self {
        self.notify = Some(notify);
        self
    }
}

#[async_trait]
impl EventSink for PgDepositSink {
    async fn deliver(&self, event: DepositEvent) -> Result<(), SinkError> {
        let deposit = DepositEventInsert::from_event(&event)
            .map_err(|e| SinkError::Rejected(format!("{}: {e}", event.tx_hash)))?;

        let Some(deposit_id) = self.db.process(InsertDepositEvent { deposit }).await? else {
            debug!(
                tx_hash = %event.tx_hash,
                log_index = event.log_index,
                "Deposit already recorded"
            );
            return Ok(());
        };

        info!(
            deposit_id,
            user_id = %event.user_id,
            tx_hash = %event.tx_hash,
            "Deposit recorded"
        );

        if let Some(notify) = &self.notify {
            announce(notify, deposit_id);
        }
        Ok(())
    }
}

/// Queue a `DepositRecorded` without waiting for channel capacity.
///
/// A dropped notification only delays delivery until the webhook retry scan
/// finds the row.
fn announce(notify: &DepositRecordedSender, deposit_id: i64) -> bool {
    match notify.try_send(DepositRecorded { deposit_id }) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(deposit_id, "Webhook queue full, deposit left to the retry scan");
            false
        }
        Err(TrySendError::Closed(_)) => {
            warn!(deposit_id, "Webhook sender stopped, DepositRecorded dropped");
            false
        }
    }
}
