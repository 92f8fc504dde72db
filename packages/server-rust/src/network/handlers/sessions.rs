//! Session milestone history endpoint.

use axum::extract::{Path, State};
use axum::Json;
use callwire_core::{SessionEventsResponse, SessionId};

use super::AppState;

/// `GET /sessions/{session_id}/events` -- returns the session's retained
/// milestones, oldest first.
///
/// An unknown session is not an error: it returns an empty list, since a
/// session exists only by virtue of having recorded events.
pub async fn session_events_handler(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Json<SessionEventsResponse> {
    let events = state.engine.history().snapshot(&session_id);
    Json(SessionEventsResponse { session_id, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::ops::OperationRegistry;
    use crate::call::{CallConfig, CallEngine};
    use crate::network::{NetworkConfig, ShutdownController};
    use callwire_core::{CallId, SessionEvent};
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState {
            engine: CallEngine::new(Arc::new(OperationRegistry::new()), CallConfig::default()),
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(NetworkConfig::default()),
            metrics: None,
            provider_configured: true,
        }
    }

    #[tokio::test]
    async fn returns_recorded_milestones_in_order() {
        let state = test_state();
        let session = SessionId::from("sess-1");
        let call_id = CallId::generate();
        state.engine.history().record(
            &session,
            SessionEvent::ToolStarted {
                call_id: call_id.clone(),
                tool: "chat".into(),
                input: serde_json::json!({}),
            },
        );
        state.engine.history().record(
            &session,
            SessionEvent::ToolFinished {
                call_id: call_id.clone(),
                tool: "chat".into(),
                output: "done".into(),
            },
        );

        let response = session_events_handler(State(state), Path(session.clone())).await;
        assert_eq!(response.0.session_id, session);
        assert_eq!(response.0.events.len(), 2);
        assert!(matches!(
            &response.0.events[0],
            SessionEvent::ToolStarted { .. }
        ));
        assert!(matches!(
            &response.0.events[1],
            SessionEvent::ToolFinished { output, .. } if output == "done"
        ));
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let response = session_events_handler(
            State(test_state()),
            Path(SessionId::from("never-seen")),
        )
        .await;
        assert!(response.0.events.is_empty());
    }
}
