//! Call admission endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use callwire_core::{ExecuteRequest, ExecuteResponse, ExecuteStatus};
use tracing::info;

use super::AppState;
use crate::call::NewCall;
use crate::network::error::ApiError;

/// `POST /execute` -- admits a call and spawns its unit of work.
///
/// Admission never waits on the operation itself: the response carries the
/// call id while tokens stream into the call's queue in the background. An
/// unknown kind is accepted here and fails inside the unit of work with an
/// `error` event; only a malformed body is rejected synchronously.
pub async fn execute_handler(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = payload?;

    let admission = state.engine.execute(NewCall {
        kind: request.kind,
        input: request.input,
        session_id: request.session_id,
        request_id: request.request_id,
    });

    let status = if admission.created {
        ExecuteStatus::Started
    } else {
        admission.status.into()
    };
    info!(call_id = %admission.call_id, ?status, "call admitted");

    Ok(Json(ExecuteResponse {
        call_id: admission.call_id,
        status,
    }))
}
