//! Watcher cursor and its persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kanau::processor::Processor;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::entities::watcher_cursor::{GetWatcherCursor, SaveWatcherCursor};
use crate::framework::DatabaseProcessor;

/// Last fully processed block height of one watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub last_processed_height: u64,
}

impl Cursor {
    pub fn new(last_processed_height: u64) -> Self {
        Self {
            last_processed_height,
        }
    }

    /// The height the watcher fetches next.
    pub fn next_height(self) -> u64 {
        self.last_processed_height.saturating_add(1)
    }

    /// The cursor after the next height has been fully processed.
    pub fn advance(self) -> Self {
        Self::new(self.next_height())
    }
}

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored height {0} is out of range")]
    OutOfRange(i64),

    #[error("height {0} does not fit the store")]
    TooHigh(u64),

    #[error("cursor store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for watcher cursors, keyed by watcher id.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, watcher_id: &str) -> Result<Option<Cursor>, CursorError>;

    async fn save(&self, watcher_id: &str, cursor: Cursor) -> Result<(), CursorError>;
}

#[async_trait]
impl<T: CursorStore + ?Sized> CursorStore for Arc<T> {
    async fn load(&self, watcher_id: &str) -> Result<Option<Cursor>, CursorError> {
        (**self).load(watcher_id).await
    }

    async fn save(&self, watcher_id: &str, cursor: Cursor) -> Result<(), CursorError> {
        (**self).save(watcher_id, cursor).await
    }
}

/// Process-local cursor store. Progress is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, Cursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, watcher_id: &str) -> Result<Option<Cursor>, CursorError> {
        Ok(self.cursors.lock().await.get(watcher_id).copied())
    }

    async fn save(&self, watcher_id: &str, cursor: Cursor) -> Result<(), CursorError> {
        let mut cursors = self.cursors.lock().await;
        let entry = cursors.entry(watcher_id.to_owned()).or_insert(cursor);
        *entry = (*entry).max(cursor);
        Ok(())
    }
}

/// Cursor store backed by the `watcher_cursors` table.
#[derive(Debug, Clone)]
pub struct PgCursorStore {
    db: DatabaseProcessor,
}

impl PgCursorStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    async fn load(&self, watcher_id: &str) -> Result<Option<Cursor>, CursorError> {
        let stored = self
            .db
            .process(GetWatcherCursor {
                watcher_id: watcher_id.to_owned(),
            })
            .await?;
        stored
            .map(|h| {
                u64::try_from(h)
                    .map(Cursor::new)
                    .map_err(|_| CursorError::OutOfRange(h))
            })
            .transpose()
    }

    async fn save(&self, watcher_id: &str, cursor: Cursor) -> Result<(), CursorError> {
        let height = i64::try_from(cursor.last_processed_height)
            .map_err(|_| CursorError::TooHigh(cursor.last_processed_height))?;
        self.db
            .process(SaveWatcherCursor {
                watcher_id: watcher_id.to_owned(),
                last_processed_height: height,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advance() {
        let cursor = Cursor::new(41);
        assert_eq!(cursor.next_height(), 42);
        assert_eq!(cursor.advance(), Cursor::new(42));
    }

    #[tokio::test]
    async fn test_memory_store_is_per_watcher_and_monotonic() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.load("a").await.unwrap(), None);

        store.save("a", Cursor::new(10)).await.unwrap();
        store.save("b", Cursor::new(3)).await.unwrap();
        store.save("a", Cursor::new(7)).await.unwrap();

        assert_eq!(store.load("a").await.unwrap(), Some(Cursor::new(10)));
        assert_eq!(store.load("b").await.unwrap(), Some(Cursor::new(3)));
    }
}
