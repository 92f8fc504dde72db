//! Cancellation endpoints.

use axum::extract::{Path, State};
use axum::Json;
use callwire_core::{CallId, CallStatus, CancelAllResponse, CancelResponse};
use tracing::info;

use super::AppState;
use crate::network::error::ApiError;

/// `POST /cancel/{call_id}` -- requests cancellation of one call.
///
/// Succeeds for any retained call, including ones already terminal; the
/// cancel claim is idempotent and never rewinds a terminal status. Only an
/// unknown (or already evicted) id fails.
pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(call_id): Path<CallId>,
) -> Result<Json<CancelResponse>, ApiError> {
    state.engine.cancel(&call_id)?;
    info!(call_id = %call_id, "cancel requested");

    Ok(Json(CancelResponse {
        status: CallStatus::Cancelled,
    }))
}

/// `POST /cancel_all` -- cancels every non-terminal call.
pub async fn cancel_all_handler(State(state): State<AppState>) -> Json<CancelAllResponse> {
    let call_ids = state.engine.cancel_all();
    info!(count = call_ids.len(), "cancel_all requested");

    Json(CancelAllResponse {
        status: CallStatus::Cancelled,
        count: call_ids.len(),
        call_ids,
    })
}
