//! Liveness, readiness, and metrics endpoint handlers.
//!
//! These handlers expose server health information for orchestrators
//! (Kubernetes, load balancers) and operational monitoring. All three
//! are served without authentication.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, warn};

use super::AppState;
use crate::network::HealthState;

/// Liveness probe -- always returns `{"status": "ok"}` with 200.
///
/// The liveness probe only checks whether the process is running and
/// responsive. It intentionally does not check downstream dependencies
/// or health state, because a failed liveness probe triggers a restart.
pub async fn healthz_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Readiness probe -- returns `{"ready": true}` when the server can take
/// traffic, otherwise 503 with the list of blocking reasons.
///
/// A reason is reported for a missing provider credential and for every
/// lifecycle state other than `Ready`, so an orchestrator pulls the
/// instance out of rotation during startup and drain.
pub async fn readyz_handler(State(state): State<AppState>) -> Response {
    let mut reasons = Vec::new();
    if !state.provider_configured {
        reasons.push("missing OPENAI_API_KEY");
    }
    match state.shutdown.health_state() {
        HealthState::Ready => {}
        HealthState::Starting => reasons.push("starting"),
        HealthState::Draining => reasons.push("draining"),
        HealthState::Stopped => reasons.push("stopped"),
    }

    if reasons.is_empty() {
        debug!("ready check: ready");
        Json(json!({"ready": true})).into_response()
    } else {
        warn!(reasons = reasons.join(", "), "ready check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ready": false, "reasons": reasons})),
        )
            .into_response()
    }
}

/// Renders the Prometheus exposition snapshot.
///
/// Returns 404 when the process runs without a metrics recorder (tests,
/// or embedded use of the router).
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
