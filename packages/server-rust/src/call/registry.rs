//! Authoritative store of call records, queues, and the idempotency index.
//!
//! All shared call state lives here behind concurrent maps; components
//! receive the registry by `Arc` so tests get isolation from fresh
//! instances. Finalization goes through [`CallRegistry::complete`], the
//! single place that claims a call's terminal transition, which is how the
//! exactly-one-terminal-event guarantee is enforced.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use callwire_core::{CallEvent, CallId, CallStatus, RequestId, SessionEvent, SessionId};

use super::config::CallConfig;
use super::queue::EventQueue;

/// Creation parameters for one call.
#[derive(Debug, Clone)]
pub struct NewCall {
    /// Operation kind tag, dispatched against the handler registry.
    pub kind: String,
    /// Opaque structured input for the operation handler.
    pub input: Value,
    /// Session to mirror milestones into, if any.
    pub session_id: Option<SessionId>,
    /// Idempotency token, if the client supplied one.
    pub request_id: Option<RequestId>,
}

/// Terminal outcome of a unit of work.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// The provider stream completed; carries the accumulated text.
    Finished { text: String },
    /// The unit of work failed; carries the captured message.
    Failed { message: String },
    /// Cancellation was observed; carries the cancellation message.
    Cancelled { message: String },
}

impl CallOutcome {
    #[must_use]
    pub fn status(&self) -> CallStatus {
        match self {
            Self::Finished { .. } => CallStatus::Finished,
            Self::Failed { .. } => CallStatus::Error,
            Self::Cancelled { .. } => CallStatus::Cancelled,
        }
    }

    fn into_event(self) -> CallEvent {
        match self {
            Self::Finished { text } => CallEvent::Final { text },
            Self::Failed { message } => CallEvent::Error { message },
            Self::Cancelled { message } => CallEvent::Cancelled { message },
        }
    }

    /// Session milestone summarizing this outcome for the given call.
    #[must_use]
    pub fn milestone(&self, record: &CallRecord) -> SessionEvent {
        match self {
            Self::Finished { text } => SessionEvent::ToolFinished {
                call_id: record.id.clone(),
                tool: record.kind.clone(),
                output: text.clone(),
            },
            Self::Failed { message } => SessionEvent::ToolError {
                call_id: record.id.clone(),
                tool: record.kind.clone(),
                error: message.clone(),
            },
            Self::Cancelled { message } => SessionEvent::ToolCancelled {
                call_id: record.id.clone(),
                message: message.clone(),
            },
        }
    }
}

/// Mutable lifecycle state of a call. Result and error are write-once:
/// only the terminal claim in [`CallRegistry::complete`] sets them.
#[derive(Debug)]
struct CallState {
    status: CallStatus,
    result: Option<String>,
    error: Option<String>,
}

/// One tracked call: immutable creation parameters plus guarded state,
/// the event queue, and the cooperative cancellation token.
#[derive(Debug)]
pub struct CallRecord {
    pub id: CallId,
    pub kind: String,
    pub input: Value,
    pub session_id: Option<SessionId>,
    pub request_id: Option<RequestId>,
    state: RwLock<CallState>,
    queue: EventQueue,
    cancel: CancellationToken,
}

impl CallRecord {
    fn new(id: CallId, params: NewCall) -> Self {
        Self {
            id,
            kind: params.kind,
            input: params.input,
            session_id: params.session_id,
            request_id: params.request_id,
            state: RwLock::new(CallState {
                status: CallStatus::Pending,
                result: None,
                error: None,
            }),
            queue: EventQueue::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> CallStatus {
        self.state.read().status
    }

    /// Final text, present only once the call finished.
    #[must_use]
    pub fn result(&self) -> Option<String> {
        self.state.read().result.clone()
    }

    /// Failure message, present only once the call errored.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// The call's event queue.
    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// A clone of the cooperative cancellation token for this call.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Transitions `pending -> running`.
    ///
    /// Returns `false` if the call is not pending anymore, which happens
    /// when cancellation claimed the terminal state before the unit of work
    /// was scheduled; the caller must then exit without producing events.
    pub fn mark_running(&self) -> bool {
        let mut state = self.state.write();
        if state.status == CallStatus::Pending {
            state.status = CallStatus::Running;
            true
        } else {
            false
        }
    }
}

/// Snapshot held by the idempotency index: which call a request id resolved
/// to, and the status recorded at its last terminal transition (or pending).
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub call_id: CallId,
    pub status: CallStatus,
}

/// Result of an idempotent creation attempt.
#[derive(Debug)]
pub enum BeginOutcome {
    /// A new call was created; the caller must spawn its unit of work.
    Created(Arc<CallRecord>),
    /// The request id was seen before; no new call was created.
    Replayed { call_id: CallId, status: CallStatus },
}

/// Receipt returned to the path that won a call's terminal claim.
///
/// Exactly one receipt is ever issued per call; the holder is responsible
/// for mirroring the matching milestone into session history.
#[derive(Debug)]
pub struct CompletionReceipt {
    pub record: Arc<CallRecord>,
    pub status: CallStatus,
}

/// Thread-safe registry of all calls, keyed by call id, with the
/// request-id idempotency index and bounded retention of terminal calls.
#[derive(Debug)]
pub struct CallRegistry {
    calls: DashMap<CallId, Arc<CallRecord>>,
    request_index: DashMap<RequestId, IdempotencyRecord>,
    terminal_order: Mutex<VecDeque<CallId>>,
    config: CallConfig,
}

impl CallRegistry {
    #[must_use]
    pub fn new(config: CallConfig) -> Self {
        Self {
            calls: DashMap::new(),
            request_index: DashMap::new(),
            terminal_order: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Creates a call, or replays the existing one for a repeated request id.
    ///
    /// Creation and request-id registration are a single atomic
    /// insert-if-absent: of two racing submissions with the same request id,
    /// exactly one creates the call and the other observes it.
    pub fn begin_call(&self, params: NewCall) -> BeginOutcome {
        let Some(request_id) = params.request_id.clone() else {
            return BeginOutcome::Created(self.insert_record(params));
        };

        match self.request_index.entry(request_id) {
            Entry::Occupied(entry) => {
                let snapshot = self.live_snapshot(entry.get());
                BeginOutcome::Replayed {
                    call_id: snapshot.call_id,
                    status: snapshot.status,
                }
            }
            Entry::Vacant(entry) => {
                let record = self.insert_record(params);
                entry.insert(IdempotencyRecord {
                    call_id: record.id.clone(),
                    status: CallStatus::Pending,
                });
                BeginOutcome::Created(record)
            }
        }
    }

    /// Idempotency probe: resolves a request id to its call and status.
    ///
    /// While the call record is retained the live status is reported;
    /// after eviction the index itself would answer, but index entries are
    /// evicted together with their records, so this returns `None` then.
    pub fn lookup_by_request_id(&self, request_id: &RequestId) -> Option<IdempotencyRecord> {
        self.request_index
            .get(request_id)
            .map(|entry| self.live_snapshot(entry.value()))
    }

    /// Looks up a call by id.
    pub fn get(&self, id: &CallId) -> Option<Arc<CallRecord>> {
        self.calls.get(id).map(|entry| entry.value().clone())
    }

    /// All calls whose unit of work has not reached a terminal state.
    #[must_use]
    pub fn active_calls(&self) -> Vec<Arc<CallRecord>> {
        self.calls
            .iter()
            .filter(|entry| !entry.value().status().is_terminal())
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Total calls currently retained.
    #[must_use]
    pub fn count(&self) -> usize {
        self.calls.len()
    }

    /// Claims the terminal transition for a call.
    ///
    /// The winner records the outcome (status, write-once result or error),
    /// pushes the single terminal event onto the queue, updates the
    /// idempotency snapshot, and schedules retention bookkeeping. Every
    /// later attempt observes the claim and gets `None`, making completion
    /// idempotent across racing paths (natural completion, provider
    /// failure, cancellation, abnormal task exit).
    ///
    /// Returns `None` also when the call id is unknown (evicted).
    pub fn complete(&self, id: &CallId, outcome: CallOutcome) -> Option<CompletionReceipt> {
        let record = self.get(id)?;
        let status = outcome.status();

        {
            let mut state = record.state.write();
            if state.status.is_terminal() {
                return None;
            }
            state.status = status;
            match &outcome {
                CallOutcome::Finished { text } => state.result = Some(text.clone()),
                CallOutcome::Failed { message } => state.error = Some(message.clone()),
                CallOutcome::Cancelled { .. } => {}
            }
        }

        // Push after the status write so a client that reacts to the
        // terminal event observes the terminal status.
        let _ = record.queue.push_terminal(outcome.into_event());

        if let Some(request_id) = &record.request_id {
            if let Some(mut entry) = self.request_index.get_mut(request_id) {
                entry.status = status;
            }
        }

        counter!("callwire_calls_completed_total", "status" => status.as_str()).increment(1);
        tracing::debug!(call_id = %record.id, status = %status, "terminal state recorded");

        self.retire(record.id.clone());

        Some(CompletionReceipt { record, status })
    }

    fn insert_record(&self, params: NewCall) -> Arc<CallRecord> {
        let id = CallId::generate();
        let record = Arc::new(CallRecord::new(id.clone(), params));
        self.calls.insert(id, record.clone());
        counter!("callwire_calls_created_total").increment(1);
        record
    }

    fn live_snapshot(&self, index_entry: &IdempotencyRecord) -> IdempotencyRecord {
        let status = self
            .get(&index_entry.call_id)
            .map_or(index_entry.status, |record| record.status());
        IdempotencyRecord {
            call_id: index_entry.call_id.clone(),
            status,
        }
    }

    /// Enqueues a newly terminal call for retention and evicts beyond the
    /// cap, dropping record, queue, and idempotency entry together so the
    /// maps stay mutually consistent.
    fn retire(&self, id: CallId) {
        let evicted: Vec<CallId> = {
            let mut order = self.terminal_order.lock();
            order.push_back(id);
            let excess = order.len().saturating_sub(self.config.retained_terminal_max);
            order.drain(..excess).collect()
        };

        for old_id in evicted {
            if let Some((_, record)) = self.calls.remove(&old_id) {
                if let Some(request_id) = &record.request_id {
                    self.request_index.remove(request_id);
                }
                tracing::debug!(call_id = %old_id, "evicted terminal call");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> CallRegistry {
        CallRegistry::new(CallConfig::default())
    }

    fn chat_call(request_id: Option<&str>) -> NewCall {
        NewCall {
            kind: "chat".into(),
            input: json!({"messages": []}),
            session_id: None,
            request_id: request_id.map(RequestId::from),
        }
    }

    fn created(outcome: BeginOutcome) -> Arc<CallRecord> {
        match outcome {
            BeginOutcome::Created(record) => record,
            BeginOutcome::Replayed { call_id, .. } => {
                panic!("expected creation, got replay of {call_id}")
            }
        }
    }

    #[test]
    fn calls_without_request_id_get_distinct_ids() {
        let registry = registry();
        let a = created(registry.begin_call(chat_call(None)));
        let b = created(registry.begin_call(chat_call(None)));
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn same_request_id_collapses_to_one_call() {
        let registry = registry();
        let first = created(registry.begin_call(chat_call(Some("req-1"))));

        match registry.begin_call(chat_call(Some("req-1"))) {
            BeginOutcome::Replayed { call_id, status } => {
                assert_eq!(call_id, first.id);
                assert_eq!(status, CallStatus::Pending);
            }
            BeginOutcome::Created(record) => panic!("duplicate call {}", record.id),
        }
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn distinct_request_ids_get_distinct_calls() {
        let registry = registry();
        let a = created(registry.begin_call(chat_call(Some("req-a"))));
        let b = created(registry.begin_call(chat_call(Some("req-b"))));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn replay_reports_live_status() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(Some("req-1"))));
        assert!(record.mark_running());

        match registry.begin_call(chat_call(Some("req-1"))) {
            BeginOutcome::Replayed { status, .. } => assert_eq!(status, CallStatus::Running),
            BeginOutcome::Created(_) => panic!("expected replay"),
        }
    }

    #[test]
    fn lookup_by_request_id_resolves() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(Some("req-1"))));

        let snapshot = registry
            .lookup_by_request_id(&RequestId::from("req-1"))
            .expect("index entry exists");
        assert_eq!(snapshot.call_id, record.id);
        assert_eq!(snapshot.status, CallStatus::Pending);

        assert!(registry
            .lookup_by_request_id(&RequestId::from("req-unknown"))
            .is_none());
    }

    #[tokio::test]
    async fn complete_finished_records_result_and_event() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(Some("req-1"))));
        assert!(record.mark_running());

        let receipt = registry
            .complete(&record.id, CallOutcome::Finished { text: "Hello".into() })
            .expect("first completion wins");
        assert_eq!(receipt.status, CallStatus::Finished);
        assert_eq!(record.status(), CallStatus::Finished);
        assert_eq!(record.result().as_deref(), Some("Hello"));
        assert!(record.error().is_none());

        let mut rx = record.queue().take_receiver().expect("receiver");
        assert_eq!(rx.recv().await, Some(CallEvent::Final { text: "Hello".into() }));

        // Idempotency snapshot reflects the terminal status
        let snapshot = registry
            .lookup_by_request_id(&RequestId::from("req-1"))
            .expect("index entry");
        assert_eq!(snapshot.status, CallStatus::Finished);
    }

    #[tokio::test]
    async fn second_completion_loses_and_emits_nothing() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(None)));
        assert!(record.mark_running());

        assert!(registry
            .complete(&record.id, CallOutcome::Cancelled { message: "cancelled".into() })
            .is_some());
        assert!(registry
            .complete(&record.id, CallOutcome::Finished { text: "late".into() })
            .is_none());

        // Status and result are untouched by the losing path
        assert_eq!(record.status(), CallStatus::Cancelled);
        assert!(record.result().is_none());

        // Exactly one terminal event on the queue
        let mut rx = record.queue().take_receiver().expect("receiver");
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::Cancelled { message: "cancelled".into() })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn complete_failed_sets_error_write_once() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(None)));
        assert!(record.mark_running());

        assert!(registry
            .complete(&record.id, CallOutcome::Failed { message: "boom".into() })
            .is_some());
        assert_eq!(record.status(), CallStatus::Error);
        assert_eq!(record.error().as_deref(), Some("boom"));

        assert!(registry
            .complete(&record.id, CallOutcome::Failed { message: "boom 2".into() })
            .is_none());
        assert_eq!(record.error().as_deref(), Some("boom"));
    }

    #[test]
    fn mark_running_requires_pending() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(None)));

        // Cancellation claimed the terminal state before the task ran
        assert!(registry
            .complete(&record.id, CallOutcome::Cancelled { message: "cancelled by client".into() })
            .is_some());
        assert!(!record.mark_running());
        assert_eq!(record.status(), CallStatus::Cancelled);
    }

    #[test]
    fn complete_unknown_call_is_none() {
        let registry = registry();
        assert!(registry
            .complete(&CallId::from("missing"), CallOutcome::Failed { message: "x".into() })
            .is_none());
    }

    #[test]
    fn active_calls_excludes_terminal() {
        let registry = registry();
        let active = created(registry.begin_call(chat_call(None)));
        let done = created(registry.begin_call(chat_call(None)));
        assert!(registry
            .complete(&done.id, CallOutcome::Finished { text: String::new() })
            .is_some());

        let ids: Vec<CallId> = registry
            .active_calls()
            .into_iter()
            .map(|record| record.id.clone())
            .collect();
        assert_eq!(ids, vec![active.id.clone()]);
    }

    #[test]
    fn outcome_milestones_name_the_call() {
        let registry = registry();
        let record = created(registry.begin_call(chat_call(None)));

        let finished = CallOutcome::Finished { text: "out".into() };
        assert_eq!(
            finished.milestone(&record),
            SessionEvent::ToolFinished {
                call_id: record.id.clone(),
                tool: "chat".into(),
                output: "out".into(),
            }
        );

        let cancelled = CallOutcome::Cancelled { message: "cancelled by server".into() };
        assert_eq!(
            cancelled.milestone(&record),
            SessionEvent::ToolCancelled {
                call_id: record.id.clone(),
                message: "cancelled by server".into(),
            }
        );
    }

    #[test]
    fn terminal_calls_evict_fifo_beyond_cap() {
        let registry = CallRegistry::new(CallConfig {
            retained_terminal_max: 2,
            ..CallConfig::default()
        });

        let pending = created(registry.begin_call(chat_call(Some("req-pending"))));
        let mut terminal_ids = Vec::new();
        for i in 0..3 {
            let record = created(registry.begin_call(chat_call(Some(&format!("req-{i}")))));
            terminal_ids.push(record.id.clone());
            assert!(registry
                .complete(&record.id, CallOutcome::Finished { text: String::new() })
                .is_some());
        }

        // Oldest terminal call evicted, with its idempotency entry
        assert!(registry.get(&terminal_ids[0]).is_none());
        assert!(registry
            .lookup_by_request_id(&RequestId::from("req-0"))
            .is_none());

        // Newer terminal calls and the pending call are retained
        assert!(registry.get(&terminal_ids[1]).is_some());
        assert!(registry.get(&terminal_ids[2]).is_some());
        assert!(registry.get(&pending.id).is_some());
        assert!(registry
            .lookup_by_request_id(&RequestId::from("req-pending"))
            .is_some());
    }
}
