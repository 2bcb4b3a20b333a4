use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone)]
/// Load the last processed height of one watcher.
pub struct GetWatcherCursor {
    pub watcher_id: String,
}

impl Processor<GetWatcherCursor> for DatabaseProcessor {
    type Output = Option<i64>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWatcherCursor")]
    async fn process(&self, query: GetWatcherCursor) -> Result<Option<i64>, sqlx::Error> {
        let height = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT last_processed_height
            FROM watcher_cursors
            WHERE watcher_id = $1
            "#,
        )
        .bind(query.watcher_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(height)
    }
}

#[derive(Debug, Clone)]
/// Upsert the cursor of one watcher.
///
/// The stored height never moves backwards, even if an older write lands late.
pub struct SaveWatcherCursor {
    pub watcher_id: String,
    pub last_processed_height: i64,
}

impl Processor<SaveWatcherCursor> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SaveWatcherCursor")]
    async fn process(&self, update: SaveWatcherCursor) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO watcher_cursors (watcher_id, last_processed_height, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (watcher_id) DO UPDATE
            SET last_processed_height = GREATEST(
                    watcher_cursors.last_processed_height,
                    EXCLUDED.last_processed_height
                ),
                updated_at = NOW()
            "#,
        )
        .bind(update.watcher_id)
        .bind(update.last_processed_height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
