use axum::{Json, response::IntoResponse};
use depwatch_sdk::objects::admin::PayoutRequest;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /payouts`: broadcast a transfer from the custodial address.
///
/// Responds once the node accepted the transaction; confirmation is not
/// awaited.
pub async fn create_payout(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Json(request): Json<PayoutRequest>,
) -> Result<impl IntoResponse, AdminApiError> {
    let payouts = state
        .payouts
        .as_ref()
        .ok_or(AdminApiError::PayoutsDisabled)?;

    tracing::info!(
        asset_kind = %request.asset_kind,
        to = %request.to_address,
        amount = %request.amount,
        "Admin requested payout"
    );

    let result = payouts
        .pay(request.asset_kind, &request.to_address, request.amount)
        .await
        .map_err(AdminApiError::Payout)?;

    Ok(Json(result))
}
