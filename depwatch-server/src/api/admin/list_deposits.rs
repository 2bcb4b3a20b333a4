use axum::{Json, extract::Query, response::IntoResponse};
use depwatch_core::entities::deposit_event::ListDepositEvents;
use depwatch_core::framework::DatabaseProcessor;
use depwatch_sdk::objects::admin::{ListDepositsQuery, clamp_pagination};
use kanau::processor::Processor;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, deposit_to_admin_response};

/// `GET /deposits`: list recorded deposits, newest first.
pub async fn list_deposits(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<ListDepositsQuery>,
) -> Result<impl IntoResponse, AdminApiError> {
    let processor = DatabaseProcessor::new(state.db.clone());

    let (limit, offset) = clamp_pagination(query.limit, query.offset);

    let records = processor
        .process(ListDepositEvents {
            limit,
            offset,
            user_id: query.user_id,
            asset_kind: query.asset_kind.map(Into::into),
        })
        .await
        .map_err(AdminApiError::Database)?;

    let page: Vec<_> = records.iter().map(deposit_to_admin_response).collect();
    Ok(Json(page))
}
