//! Drives each call's unit of work on its own task.
//!
//! One task per in-flight call: resolve the handler, stream tokens,
//! forward each as a `partial` event, accumulate, then claim the terminal
//! transition. An RAII guard finalizes the call even when the task exits
//! abnormally, so no call is ever left non-terminal by a dead task.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use callwire_core::{CallId, SessionEvent};

use super::history::SessionHistory;
use super::ops::OperationRegistry;
use super::registry::{CallOutcome, CallRecord, CallRegistry};

/// Message recorded when a unit of work observes its own cancellation token.
const SELF_CANCELLED: &str = "cancelled";

/// Spawns and tracks the per-call units of work.
#[derive(Debug)]
pub struct ExecutionSupervisor {
    registry: Arc<CallRegistry>,
    operations: Arc<OperationRegistry>,
    history: Arc<SessionHistory>,
    tasks: DashMap<CallId, JoinHandle<()>>,
}

impl ExecutionSupervisor {
    #[must_use]
    pub fn new(
        registry: Arc<CallRegistry>,
        operations: Arc<OperationRegistry>,
        history: Arc<SessionHistory>,
    ) -> Self {
        Self {
            registry,
            operations,
            history,
            tasks: DashMap::new(),
        }
    }

    /// Spawns the unit of work for a freshly created call.
    pub fn spawn_call(self: &Arc<Self>, record: Arc<CallRecord>) {
        let supervisor = Arc::clone(self);
        let unit = Arc::clone(&record);
        let handle = tokio::spawn(async move {
            supervisor.run_unit(unit).await;
        });

        self.tasks.insert(record.id.clone(), handle);
        // The unit may already have finalized and missed its own bookkeeping
        // entry; drop the stale handle in that case.
        if record.status().is_terminal() {
            self.tasks.remove(&record.id);
        }
    }

    /// Number of units of work currently tracked.
    #[must_use]
    pub fn active_units(&self) -> usize {
        self.tasks.len()
    }

    /// Waits until no units of work remain, up to `timeout`.
    ///
    /// Used during drain after a server-wide cancel; returns `false` if the
    /// deadline passed with units still running.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.tasks.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    async fn run_unit(&self, record: Arc<CallRecord>) {
        let mut guard = FinalizeGuard {
            supervisor: self,
            call_id: record.id.clone(),
            running: false,
            finalized: false,
        };

        if !record.mark_running() {
            // A cancel claimed the call before this task was scheduled; the
            // terminal event is already on the queue.
            guard.finalized = true;
            return;
        }

        counter!("callwire_calls_started_total").increment(1);
        gauge!("callwire_calls_active").increment(1.0);
        guard.running = true;
        tracing::info!(call_id = %record.id, kind = %record.kind, "unit of work running");

        if let Some(session_id) = &record.session_id {
            self.history.record(
                session_id,
                SessionEvent::ToolStarted {
                    call_id: record.id.clone(),
                    tool: record.kind.clone(),
                    input: record.input.clone(),
                },
            );
        }

        let outcome = self.drive(&record).await;
        self.finalize(&record.id, outcome);
        guard.finalized = true;
    }

    /// Runs the streaming loop until a terminal outcome.
    async fn drive(&self, record: &CallRecord) -> CallOutcome {
        let cancel = record.cancel_token();

        let Some(handler) = self.operations.get(&record.kind) else {
            return CallOutcome::Failed {
                message: format!("Unknown kind: {}", record.kind),
            };
        };

        let started = tokio::select! {
            () = cancel.cancelled() => {
                return CallOutcome::Cancelled { message: SELF_CANCELLED.to_owned() };
            }
            started = handler.run(record.input.clone()) => started,
        };

        let mut stream = match started {
            Ok(stream) => stream,
            Err(err) => {
                return CallOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };

        let mut accumulated = String::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    return CallOutcome::Cancelled { message: SELF_CANCELLED.to_owned() };
                }
                token = stream.next() => match token {
                    Some(Ok(token)) => {
                        accumulated.push_str(&token);
                        if !record.queue().push_partial(token) {
                            // Queue already carries a terminal event, so a
                            // competing path finished this call.
                            return CallOutcome::Cancelled { message: SELF_CANCELLED.to_owned() };
                        }
                    }
                    Some(Err(err)) => {
                        return CallOutcome::Failed { message: err.to_string() };
                    }
                    None => return CallOutcome::Finished { text: accumulated },
                },
            }
        }
    }

    /// Attempts the terminal claim and mirrors the milestone on a win.
    fn finalize(&self, call_id: &CallId, outcome: CallOutcome) {
        let Some(receipt) = self.registry.complete(call_id, outcome.clone()) else {
            return;
        };
        if let Some(session_id) = &receipt.record.session_id {
            self.history
                .record(session_id, outcome.milestone(&receipt.record));
        }
        tracing::info!(call_id = %call_id, status = %receipt.status, "unit of work finalized");
    }
}

/// Cleanup guard for one unit of work.
///
/// Dropped on every exit path of `run_unit`, including panics and task
/// aborts: if the unit never finalized, the guard claims the terminal
/// transition with an error outcome, then releases the task bookkeeping.
struct FinalizeGuard<'a> {
    supervisor: &'a ExecutionSupervisor,
    call_id: CallId,
    running: bool,
    finalized: bool,
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            self.supervisor.finalize(
                &self.call_id,
                CallOutcome::Failed {
                    message: "unit of work aborted".to_owned(),
                },
            );
        }
        if self.running {
            gauge!("callwire_calls_active").decrement(1.0);
        }
        self.supervisor.tasks.remove(&self.call_id);
    }
}
