//! Client-facing cancellation of calls.
//!
//! Cancellation is cooperative: the controller triggers the call's token so
//! a running unit of work stops at its next token boundary, then attempts
//! the terminal claim directly so status and idempotency reads observe the
//! cancellation immediately, without waiting for the unit to wind down.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;

use callwire_core::CallId;

use super::history::SessionHistory;
use super::registry::{CallOutcome, CallRegistry};

/// Message recorded for a single-call cancel.
const CLIENT_CANCELLED: &str = "cancelled by client";
/// Message recorded when the server cancels every active call.
const SERVER_CANCELLED: &str = "cancelled by server";

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("call not found: {0}")]
    NotFound(CallId),
}

/// Cancels calls on behalf of clients and server-wide drains.
#[derive(Debug)]
pub struct CancellationController {
    registry: Arc<CallRegistry>,
    history: Arc<SessionHistory>,
}

impl CancellationController {
    #[must_use]
    pub fn new(registry: Arc<CallRegistry>, history: Arc<SessionHistory>) -> Self {
        Self { registry, history }
    }

    /// Cancels one call.
    ///
    /// Succeeds idempotently when the call is already terminal: the
    /// terminal status is left untouched and no second terminal event is
    /// pushed.
    ///
    /// # Errors
    ///
    /// Fails when no call exists under `call_id`.
    pub fn cancel(&self, call_id: &CallId) -> Result<(), CancelError> {
        let record = self
            .registry
            .get(call_id)
            .ok_or_else(|| CancelError::NotFound(call_id.clone()))?;

        record.cancel_token().cancel();
        self.claim(call_id, CLIENT_CANCELLED);

        counter!("callwire_cancel_requests_total", "scope" => "single").increment(1);
        tracing::info!(call_id = %call_id, "cancel requested");
        Ok(())
    }

    /// Cancels every call whose unit of work is still active.
    ///
    /// Returns the ids of the calls it cancelled, in iteration order.
    pub fn cancel_all(&self) -> Vec<CallId> {
        let mut cancelled = Vec::new();
        for record in self.registry.active_calls() {
            record.cancel_token().cancel();
            self.claim(&record.id, SERVER_CANCELLED);
            cancelled.push(record.id.clone());
        }

        counter!("callwire_cancel_requests_total", "scope" => "all").increment(1);
        tracing::info!(count = cancelled.len(), "cancel all requested");
        cancelled
    }

    /// Attempts the cancelled terminal claim, mirroring the milestone on a
    /// win; losing the claim means the call was already terminal.
    fn claim(&self, call_id: &CallId, message: &str) {
        let outcome = CallOutcome::Cancelled {
            message: message.to_owned(),
        };
        if let Some(receipt) = self.registry.complete(call_id, outcome.clone()) {
            if let Some(session_id) = &receipt.record.session_id {
                self.history
                    .record(session_id, outcome.milestone(&receipt.record));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use callwire_core::{CallEvent, CallStatus, SessionEvent, SessionId};
    use serde_json::json;

    use crate::call::config::CallConfig;
    use crate::call::registry::{BeginOutcome, CallRecord, NewCall};

    use super::*;

    struct Harness {
        registry: Arc<CallRegistry>,
        history: Arc<SessionHistory>,
        controller: CancellationController,
    }

    fn harness() -> Harness {
        let registry = Arc::new(CallRegistry::new(CallConfig::default()));
        let history = Arc::new(SessionHistory::new(50));
        let controller = CancellationController::new(Arc::clone(&registry), Arc::clone(&history));
        Harness {
            registry,
            history,
            controller,
        }
    }

    fn begin(harness: &Harness, session: Option<&str>) -> Arc<CallRecord> {
        match harness.registry.begin_call(NewCall {
            kind: "chat".into(),
            input: json!({ "messages": [] }),
            session_id: session.map(SessionId::from),
            request_id: None,
        }) {
            BeginOutcome::Created(record) => record,
            BeginOutcome::Replayed { .. } => unreachable!("no request id supplied"),
        }
    }

    #[tokio::test]
    async fn cancel_claims_terminal_state_and_event() {
        let harness = harness();
        let record = begin(&harness, Some("s1"));
        assert!(record.mark_running());

        harness.controller.cancel(&record.id).expect("cancel succeeds");

        assert_eq!(record.status(), CallStatus::Cancelled);
        assert!(record.cancel_token().is_cancelled());

        let mut rx = record.queue().take_receiver().expect("receiver");
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::Cancelled { message: "cancelled by client".into() })
        );
        assert!(rx.try_recv().is_err());

        assert_eq!(
            harness.history.snapshot(&SessionId::from("s1")),
            vec![SessionEvent::ToolCancelled {
                call_id: record.id.clone(),
                message: "cancelled by client".into(),
            }]
        );
    }

    #[test]
    fn cancel_unknown_call_fails() {
        let harness = harness();
        let missing = CallId::from("missing");
        assert!(matches!(
            harness.controller.cancel(&missing),
            Err(CancelError::NotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn cancel_after_terminal_is_idempotent() {
        let harness = harness();
        let record = begin(&harness, Some("s1"));
        assert!(record.mark_running());
        assert!(harness
            .registry
            .complete(&record.id, CallOutcome::Finished { text: "done".into() })
            .is_some());

        harness.controller.cancel(&record.id).expect("cancel succeeds");

        // Terminal status untouched, no second terminal event
        assert_eq!(record.status(), CallStatus::Finished);
        assert_eq!(record.result().as_deref(), Some("done"));

        let mut rx = record.queue().take_receiver().expect("receiver");
        assert_eq!(rx.recv().await, Some(CallEvent::Final { text: "done".into() }));
        assert!(rx.try_recv().is_err());

        // No cancelled milestone was mirrored
        assert!(harness.history.snapshot(&SessionId::from("s1")).is_empty());
    }

    #[tokio::test]
    async fn cancel_all_touches_only_active_calls() {
        let harness = harness();
        let running = begin(&harness, Some("s1"));
        assert!(running.mark_running());
        let pending = begin(&harness, None);
        let finished = begin(&harness, None);
        assert!(finished.mark_running());
        assert!(harness
            .registry
            .complete(&finished.id, CallOutcome::Finished { text: String::new() })
            .is_some());

        let cancelled: std::collections::HashSet<CallId> =
            harness.controller.cancel_all().into_iter().collect();
        let expected: std::collections::HashSet<CallId> =
            [running.id.clone(), pending.id.clone()].into_iter().collect();
        assert_eq!(cancelled, expected);

        assert_eq!(running.status(), CallStatus::Cancelled);
        assert_eq!(pending.status(), CallStatus::Cancelled);
        assert_eq!(finished.status(), CallStatus::Finished);

        let mut rx = running.queue().take_receiver().expect("receiver");
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::Cancelled { message: "cancelled by server".into() })
        );
        assert_eq!(
            harness.history.snapshot(&SessionId::from("s1")),
            vec![SessionEvent::ToolCancelled {
                call_id: running.id.clone(),
                message: "cancelled by server".into(),
            }]
        );
    }

    #[test]
    fn cancel_all_with_no_active_calls_is_empty() {
        let harness = harness();
        assert!(harness.controller.cancel_all().is_empty());
    }
}
