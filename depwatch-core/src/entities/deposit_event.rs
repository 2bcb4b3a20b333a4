use std::num::TryFromIntError;

use crate::entities::AssetKindName;
use crate::framework::DatabaseProcessor;
use depwatch_sdk::objects::{DepositEvent, UserId};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::types::Json;

const RECORD_COLUMNS: &str = "id, user_id, asset_kind, address, amount, tx_hash, log_index, \
    block_height, webhook_retry_count, webhook_success_at, webhook_last_tried_at, created_at";

/// A persisted deposit together with its webhook delivery state.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DepositEventRecord {
    pub id: i64,
    pub user_id: Json<UserId>,
    pub asset_kind: AssetKindName,
    pub address: String,
    pub amount: Decimal,
    pub tx_hash: String,
    pub log_index: Option<i64>,
    pub block_height: i64,
    pub webhook_retry_count: i32,
    pub webhook_success_at: Option<time::PrimitiveDateTime>,
    pub webhook_last_tried_at: Option<time::PrimitiveDateTime>,
    pub created_at: time::PrimitiveDateTime,
}

/// Data for inserting a new deposit.
#[derive(Debug, Clone)]
pub struct DepositEventInsert {
    pub user_id: UserId,
    pub asset_kind: AssetKindName,
    pub address: String,
    pub amount: Decimal,
    pub tx_hash: String,
    pub log_index: Option<i64>,
    pub block_height: i64,
}

impl DepositEventInsert {
    /// Fails only for heights or log indexes beyond `i64::MAX`.
    pub fn from_event(event: &DepositEvent) -> Result<Self, TryFromIntError> {
        Ok(Self {
            user_id: event.user_id.clone(),
            asset_kind: event.asset_kind.into(),
            address: event.address.to_string(),
            amount: event.amount,
            tx_hash: event.tx_hash.to_string(),
            log_index: event.log_index.map(i64::try_from).transpose()?,
            block_height: i64::try_from(event.block_height)?,
        })
    }
}

#[derive(Debug, Clone)]
/// Insert a deposit unless `(tx_hash, log_index)` is already recorded.
///
/// Returns the new row id, or `None` for a replayed event.
pub struct InsertDepositEvent {
    pub deposit: DepositEventInsert,
}

impl Processor<InsertDepositEvent> for DatabaseProcessor {
    type Output = Option<i64>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertDepositEvent")]
    async fn process(&self, insert: InsertDepositEvent) -> Result<Option<i64>, sqlx::Error> {
        let deposit = insert.deposit;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO deposit_events
                (user_id, asset_kind, address, amount, tx_hash, log_index, block_height)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tx_hash, log_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Json(deposit.user_id))
        .bind(deposit.asset_kind)
        .bind(deposit.address)
        .bind(deposit.amount)
        .bind(deposit.tx_hash)
        .bind(deposit.log_index)
        .bind(deposit.block_height)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }
}

#[derive(Debug, Clone)]
pub struct GetDepositEventById {
    pub id: i64,
}

impl Processor<GetDepositEventById> for DatabaseProcessor {
    type Output = Option<DepositEventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDepositEventById")]
    async fn process(
        &self,
        query: GetDepositEventById,
    ) -> Result<Option<DepositEventRecord>, sqlx::Error> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM deposit_events WHERE id = $1");
        sqlx::query_as::<_, DepositEventRecord>(&sql)
            .bind(query.id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Page through recorded deposits, newest first.
pub struct ListDepositEvents {
    pub limit: i64,
    pub offset: i64,
    /// Matches the user id's text form, for both integer and string ids.
    pub user_id: Option<String>,
    pub asset_kind: Option<AssetKindName>,
}

impl Processor<ListDepositEvents> for DatabaseProcessor {
    type Output = Vec<DepositEventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListDepositEvents")]
    async fn process(
        &self,
        query: ListDepositEvents,
    ) -> Result<Vec<DepositEventRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM deposit_events \
             WHERE ($1::TEXT IS NULL OR user_id #>> '{{}}' = $1) \
               AND ($2::asset_kind IS NULL OR asset_kind = $2) \
             ORDER BY id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, DepositEventRecord>(&sql)
            .bind(query.user_id)
            .bind(query.asset_kind)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct MarkDepositWebhookSuccess {
    pub id: i64,
}

impl Processor<MarkDepositWebhookSuccess> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkDepositWebhookSuccess")]
    async fn process(&self, update: MarkDepositWebhookSuccess) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE deposit_events
            SET webhook_success_at = NOW(), webhook_last_tried_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IncrementDepositWebhookRetry {
    pub id: i64,
}

impl Processor<IncrementDepositWebhookRetry> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:IncrementDepositWebhookRetry")]
    async fn process(&self, update: IncrementDepositWebhookRetry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE deposit_events
            SET webhook_retry_count = webhook_retry_count + 1,
                webhook_last_tried_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Undelivered deposits whose backoff (`2^retry_count` seconds) has elapsed.
///
/// Deposits never tried are picked up only after 30 seconds, leaving the
/// first attempt to the live notification path.
pub struct GetDepositsForWebhookRetry {
    pub max_retry_count: i32,
    pub limit: i64,
}

impl Processor<GetDepositsForWebhookRetry> for DatabaseProcessor {
    type Output = Vec<DepositEventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDepositsForWebhookRetry")]
    async fn process(
        &self,
        query: GetDepositsForWebhookRetry,
    ) -> Result<Vec<DepositEventRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM deposit_events \
             WHERE webhook_success_at IS NULL \
               AND webhook_retry_count <= $1 \
               AND ( \
                 (webhook_last_tried_at IS NULL AND created_at < NOW() - INTERVAL '30 seconds') \
                 OR webhook_last_tried_at \
                    + make_interval(secs => power(2, webhook_retry_count)) < NOW() \
               ) \
             ORDER BY created_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, DepositEventRecord>(&sql)
            .bind(query.max_retry_count)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
    }
}
