//! WebhookSender processor.
//!
//! The WebhookSender is responsible for:
//! - Receiving `DepositRecorded` from the queue
//! - Loading the deposit and signing a `DepositReceivedPayload`
//! - Sending HTTP POST requests with the `Depwatch-Signature` header
//! - Handling retries with exponential backoff (2^0 to 2^11 seconds)
//! - Updating `webhook_retry_count` and `webhook_last_tried_at` in the database

use std::time::Duration;

use depwatch_sdk::objects::webhook::{DEPOSIT_RECEIVED_EVENT, DepositReceivedPayload};
use depwatch_sdk::objects::{Address, TxHash};
use depwatch_sdk::signature::{SIGNATURE_HEADER, SignedWebhook};
use kanau::processor::Processor;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::WebhookConfig;
use crate::entities::deposit_event::{
    DepositEventRecord, GetDepositEventById, GetDepositsForWebhookRetry,
    IncrementDepositWebhookRetry, MarkDepositWebhookSuccess,
};
use crate::events::{DepositRecorded, DepositRecordedReceiver};
use crate::framework::DatabaseProcessor;

/// Maximum retry attempts (2^11 = 2048 seconds max backoff)
const MAX_RETRY_COUNT: u32 = 11;

/// How often the background loop looks for due retries.
const RETRY_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Deposits picked per retry scan.
const RETRY_BATCH: i64 = 10;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("deposit not found: {0}")]
    DepositNotFound(i64),

    /// Webhook endpoint answered with a non-success status
    #[error("webhook delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored deposit {0} has negative height or log index")]
    CorruptRecord(i64),
}

/// WebhookSender delivers deposit notifications to the configured endpoint.
pub struct WebhookSender {
    db: DatabaseProcessor,
    webhook: WebhookConfig,
    recorded_rx: DepositRecordedReceiver,
    shutdown_rx: watch::Receiver<bool>,
    http_client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(
        db: DatabaseProcessor,
        webhook: WebhookConfig,
        recorded_rx: DepositRecordedReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            webhook,
            recorded_rx,
            shutdown_rx,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Run the WebhookSender.
    pub async fn run(mut self) {
        info!(url = %self.webhook.url, "WebhookSender started");

        let retry_handle = tokio::spawn(Self::retry_failed_webhooks_loop(
            self.db.clone(),
            self.http_client.clone(),
            self.webhook.clone(),
            self.shutdown_rx.clone(),
        ));

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("WebhookSender received shutdown signal");
                        break;
                    }
                }

                Some(event) = self.recorded_rx.recv() => {
                    debug!(deposit_id = event.deposit_id, "Received DepositRecorded");

                    if let Err(e) = self.process_event(event).await {
                        error!(deposit_id = event.deposit_id, error = %e, "Failed to process DepositRecorded");
                    }
                }

                else => {
                    info!("DepositRecorded channel closed");
                    break;
                }
            }
        }

        let _ = retry_handle.await;

        info!("WebhookSender shutdown complete");
    }

    async fn process_event(&self, event: DepositRecorded) -> Result<(), WebhookError> {
        let Some(record) = self
            .db
            .process(GetDepositEventById {
                id: event.deposit_id,
            })
            .await?
        else {
            return Err(WebhookError::DepositNotFound(event.deposit_id));
        };
        Self::deliver_record(&self.db, &self.http_client, &self.webhook, &record).await
    }

    /// Send one deposit and record the outcome.
    async fn deliver_record(
        db: &DatabaseProcessor,
        http_client: &reqwest::Client,
        webhook: &WebhookConfig,
        record: &DepositEventRecord,
    ) -> Result<(), WebhookError> {
        let payload = build_payload(record, time::OffsetDateTime::now_utc().unix_timestamp())?;
        let signed = SignedWebhook::seal(payload, &webhook.secret)?;
        let signature = signed.signature().to_string();

        let result = Self::send_webhook(http_client, webhook, signed.json(), &signature).await;

        match &result {
            Ok(()) => {
                db.process(MarkDepositWebhookSuccess { id: record.id }).await?;
                info!(
                    deposit_id = record.id,
                    retry_count = record.webhook_retry_count,
                    "Webhook delivered successfully"
                );
            }
            Err(e) => {
                db.process(IncrementDepositWebhookRetry { id: record.id })
                    .await?;
                warn!(
                    deposit_id = record.id,
                    error = %e,
                    retry_count = record.webhook_retry_count + 1,
                    "Webhook delivery failed"
                );
            }
        }

        result
    }

    async fn send_webhook(
        http_client: &reqwest::Client,
        webhook: &WebhookConfig,
        body: &str,
        signature: &str,
    ) -> Result<(), WebhookError> {
        let response = http_client
            .post(webhook.url.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Background loop to retry failed webhooks.
    async fn retry_failed_webhooks_loop(
        db: DatabaseProcessor,
        http_client: reqwest::Client,
        webhook: WebhookConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Webhook retry loop started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Webhook retry loop shutting down");
                        break;
                    }
                }

                _ = tokio::time::sleep(RETRY_SCAN_INTERVAL) => {
                    if let Err(e) = Self::retry_pending_webhooks(&db, &http_client, &webhook).await {
                        error!(error = %e, "Failed to retry webhooks");
                    }
                }
            }
        }
    }

    async fn retry_pending_webhooks(
        db: &DatabaseProcessor,
        http_client: &reqwest::Client,
        webhook: &WebhookConfig,
    ) -> Result<(), WebhookError> {
        let due = db
            .process(GetDepositsForWebhookRetry {
                max_retry_count: MAX_RETRY_COUNT as i32,
                limit: RETRY_BATCH,
            })
            .await?;

        for record in due {
            match Self::deliver_record(db, http_client, webhook, &record).await {
                Ok(()) | Err(WebhookError::DeliveryFailed { .. } | WebhookError::Request(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// Build the webhook body for a stored deposit.
pub fn build_payload(
    record: &DepositEventRecord,
    timestamp: i64,
) -> Result<DepositReceivedPayload, WebhookError> {
    let corrupt = |_| WebhookError::CorruptRecord(record.id);
    Ok(DepositReceivedPayload {
        event_type: DEPOSIT_RECEIVED_EVENT.to_string(),
        deposit_id: record.id,
        user_id: record.user_id.0.clone(),
        asset_kind: record.asset_kind.into(),
        amount: record.amount,
        address: Address::normalize(&record.address),
        tx_hash: TxHash::normalize(&record.tx_hash),
        log_index: record.log_index.map(u64::try_from).transpose().map_err(corrupt)?,
        block_height: u64::try_from(record.block_height).map_err(corrupt)?,
        timestamp,
    })
}
