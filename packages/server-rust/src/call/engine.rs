//! Wiring for the call engine.
//!
//! [`CallEngine`] owns one instance of every moving part and is the only
//! thing handlers need to hold. Cloning is cheap; all fields are shared.

use std::sync::Arc;

use callwire_core::{CallId, CallStatus};

use super::config::CallConfig;
use super::controller::{CancelError, CancellationController};
use super::history::SessionHistory;
use super::ops::OperationRegistry;
use super::registry::{BeginOutcome, CallRegistry, NewCall};
use super::supervisor::ExecutionSupervisor;

/// Bundled call-lifecycle components behind one handle.
#[derive(Clone)]
pub struct CallEngine {
    registry: Arc<CallRegistry>,
    operations: Arc<OperationRegistry>,
    history: Arc<SessionHistory>,
    supervisor: Arc<ExecutionSupervisor>,
    controller: Arc<CancellationController>,
    config: CallConfig,
}

/// Result of an execute request: the call id plus its status at admit time.
///
/// `created` distinguishes a fresh call from an idempotent replay; a replay
/// reports the existing call's live status instead of "started".
#[derive(Debug, Clone)]
pub struct Admission {
    pub call_id: CallId,
    pub status: CallStatus,
    pub created: bool,
}

impl CallEngine {
    /// Builds a fresh engine around the given operation registry.
    #[must_use]
    pub fn new(operations: Arc<OperationRegistry>, config: CallConfig) -> Self {
        let registry = Arc::new(CallRegistry::new(config.clone()));
        let history = Arc::new(SessionHistory::new(config.session_buffer_max));
        let supervisor = Arc::new(ExecutionSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&operations),
            Arc::clone(&history),
        ));
        let controller = Arc::new(CancellationController::new(
            Arc::clone(&registry),
            Arc::clone(&history),
        ));
        Self {
            registry,
            operations,
            history,
            supervisor,
            controller,
            config,
        }
    }

    /// Admits a call: creates (or replays) the record and, when it is new,
    /// spawns its unit of work in the background.
    pub fn execute(&self, request: NewCall) -> Admission {
        match self.registry.begin_call(request) {
            BeginOutcome::Created(record) => {
                let admission = Admission {
                    call_id: record.id.clone(),
                    status: record.status(),
                    created: true,
                };
                self.supervisor.spawn_call(record);
                admission
            }
            BeginOutcome::Replayed { call_id, status } => Admission {
                call_id,
                status,
                created: false,
            },
        }
    }

    /// Cancels one call. Fails when the id is unknown or already evicted.
    pub fn cancel(&self, call_id: &CallId) -> Result<(), CancelError> {
        self.controller.cancel(call_id)
    }

    /// Cancels every non-terminal call, returning the ids that were claimed.
    pub fn cancel_all(&self) -> Vec<CallId> {
        self.controller.cancel_all()
    }

    /// Waits until no unit of work remains, up to `timeout`.
    pub async fn wait_idle(&self, timeout: std::time::Duration) -> bool {
        self.supervisor.wait_idle(timeout).await
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn operations(&self) -> &Arc<OperationRegistry> {
        &self.operations
    }

    #[must_use]
    pub fn history(&self) -> &Arc<SessionHistory> {
        &self.history
    }

    #[must_use]
    pub fn config(&self) -> &CallConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::ops::{OperationError, OperationHandler};
    use crate::provider::TokenStream;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl OperationHandler for EchoHandler {
        fn kind(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "echo"
        }

        async fn run(&self, input: serde_json::Value) -> Result<TokenStream, OperationError> {
            let text = input["text"].as_str().unwrap_or_default().to_owned();
            Ok(Box::pin(futures_util::stream::iter([Ok(text)])))
        }
    }

    fn engine() -> CallEngine {
        let mut ops = OperationRegistry::new();
        ops.register(Arc::new(EchoHandler));
        CallEngine::new(Arc::new(ops), CallConfig::default())
    }

    async fn settle() {
        for _ in 0..1000 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn execute_runs_to_completion() {
        let engine = engine();
        let admission = engine.execute(NewCall {
            kind: "echo".into(),
            input: json!({"text": "hi"}),
            session_id: None,
            request_id: None,
        });
        assert_eq!(admission.status, CallStatus::Pending);
        assert!(admission.created);
        settle().await;

        let record = engine.registry().get(&admission.call_id).unwrap();
        assert_eq!(record.status(), CallStatus::Finished);
        assert_eq!(record.result().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn duplicate_request_id_replays_without_second_unit() {
        let engine = engine();
        let request = NewCall {
            kind: "echo".into(),
            input: json!({"text": "once"}),
            session_id: None,
            request_id: Some("req-1".into()),
        };
        let first = engine.execute(request.clone());
        settle().await;
        let second = engine.execute(request);

        assert_eq!(first.call_id, second.call_id);
        assert!(!second.created);
        assert_eq!(second.status, CallStatus::Finished);
        assert_eq!(engine.registry().count(), 1);
    }

    #[tokio::test]
    async fn cancel_all_reaps_active_calls() {
        let engine = engine();
        // Cancel right after admission, before yielding to the scheduler;
        // the unit may still win the race, so both outcomes are checked.
        let admission = engine.execute(NewCall {
            kind: "echo".into(),
            input: json!({"text": "late"}),
            session_id: None,
            request_id: None,
        });
        let claimed = engine.cancel_all();
        settle().await;

        if claimed.is_empty() {
            // The unit won the race and finished first.
            let record = engine.registry().get(&admission.call_id).unwrap();
            assert_eq!(record.status(), CallStatus::Finished);
        } else {
            assert_eq!(claimed, vec![admission.call_id.clone()]);
            let record = engine.registry().get(&admission.call_id).unwrap();
            assert_eq!(record.status(), CallStatus::Cancelled);
        }
    }
}
