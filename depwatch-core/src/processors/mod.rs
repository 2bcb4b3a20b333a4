//! Processors wired behind the deposit watcher.
//!
//! - `PgDepositSink`: records each `DepositEvent`, emits `DepositRecorded`
//! - `WebhookSender`: receives `DepositRecorded`, delivers signed webhooks

pub mod deposit_recorder;
pub mod webhook_sender;

pub use deposit_recorder::PgDepositSink;
pub use webhook_sender::{WebhookError, WebhookSender};
