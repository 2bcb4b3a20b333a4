//! Event sink: where the watcher hands detected deposits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use depwatch_sdk::objects::DepositEvent;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("event channel closed")]
    ChannelClosed,

    #[error("sink did not finish within {0:?}")]
    Timeout(Duration),

    #[error("event rejected: {0}")]
    Rejected(String),
}

/// Receives deposit events one at a time, in block order.
///
/// A failure makes the watcher back off and re-deliver the whole block, so
/// implementations must tolerate seeing an event more than once. The pair
/// `(tx_hash, log_index)` identifies an event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: DepositEvent) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn deliver(&self, event: DepositEvent) -> Result<(), SinkError> {
        (**self).deliver(event).await
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<DepositEvent> {
    async fn deliver(&self, event: DepositEvent) -> Result<(), SinkError> {
        self.send(event).await.map_err(|_| SinkError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depwatch_sdk::objects::{Address, AssetKind, TxHash, UserId};
    use rust_decimal::Decimal;

    fn event() -> DepositEvent {
        DepositEvent {
            user_id: UserId::Int(1),
            asset_kind: AssetKind::Native,
            amount: Decimal::ONE,
            tx_hash: TxHash::normalize("0x01"),
            address: Address::normalize("0xa1"),
            block_height: 1,
            log_index: None,
        }
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.deliver(event()).await.unwrap();
        assert_eq!(rx.recv().await, Some(event()));

        drop(rx);
        assert!(matches!(
            tx.deliver(event()).await,
            Err(SinkError::ChannelClosed)
        ));
    }
}
