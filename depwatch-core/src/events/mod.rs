//! Events passed between the watcher's sink and the webhook sender.
//!
//! Events carry identifiers rather than full data; the receiver re-reads the
//! current state from the database.

use tokio::sync::mpsc;

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// A deposit row was inserted and should be announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositRecorded {
    pub deposit_id: i64,
}

pub type DepositRecordedSender = mpsc::Sender<DepositRecorded>;
pub type DepositRecordedReceiver = mpsc::Receiver<DepositRecorded>;

/// Create a new DepositRecorded channel.
pub fn deposit_recorded_channel() -> (DepositRecordedSender, DepositRecordedReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
