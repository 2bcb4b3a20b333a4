use axum::{Json, response::IntoResponse};
use depwatch_sdk::objects::admin::WatcherStatusResponse;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `GET /status`: the watcher's committed progress.
pub async fn status(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
) -> impl IntoResponse {
    let cursor = *state.cursor_rx.borrow();
    Json(WatcherStatusResponse {
        watcher_id: state.watcher_id.to_string(),
        last_processed_height: cursor.map(|c| c.last_processed_height),
        payouts_enabled: state.payouts.is_some(),
    })
}
