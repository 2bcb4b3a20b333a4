//! Admin API handlers.
//!
//! Every endpoint requires the `Depwatch-Admin-Authorization` header with
//! the plaintext admin secret.
//!
//! # Endpoints
//!
//! - `GET  /status`   – watcher id and last committed height
//! - `GET  /deposits` – list recorded deposits (paginated, filterable)
//! - `POST /payouts`  – send native or token funds from the custodial address

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use depwatch_core::entities::deposit_event::DepositEventRecord;
use depwatch_core::payout::PayoutError;
use depwatch_sdk::objects::admin::AdminDepositResponse;

use crate::state::AppState;

mod create_payout;
mod list_deposits;
mod status;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::status))
        .route("/deposits", get(list_deposits::list_deposits))
        .route("/payouts", post(create_payout::create_payout))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Database(sqlx::Error),
    PayoutsDisabled,
    Payout(PayoutError),
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::Database(e) => {
                tracing::error!(error = %e, "Admin API database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::PayoutsDisabled => {
                (StatusCode::SERVICE_UNAVAILABLE, "payouts are not configured").into_response()
            }
            AdminApiError::Payout(e) => {
                let status = match &e {
                    PayoutError::InvalidAddress(_)
                    | PayoutError::InvalidAmount(_)
                    | PayoutError::TokenNotConfigured => StatusCode::BAD_REQUEST,
                    PayoutError::InsufficientBalance { .. } => StatusCode::CONFLICT,
                    PayoutError::Signing(_) | PayoutError::Ledger(_) => {
                        tracing::error!(error = %e, "Payout failed at the ledger node");
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, e.to_string()).into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn deposit_to_admin_response(r: &DepositEventRecord) -> AdminDepositResponse {
    AdminDepositResponse {
        id: r.id,
        user_id: r.user_id.0.to_string(),
        asset_kind: r.asset_kind.into(),
        address: r.address.clone(),
        amount: r.amount,
        tx_hash: r.tx_hash.clone(),
        log_index: r.log_index,
        block_height: r.block_height,
        created_at: r.created_at.assume_utc().unix_timestamp(),
        webhook_retry_count: r.webhook_retry_count,
        webhook_success_at: r.webhook_success_at.map(|t| t.assume_utc().unix_timestamp()),
        webhook_last_tried_at: r.webhook_last_tried_at.map(|t| t.assume_utc().unix_timestamp()),
    }
}
