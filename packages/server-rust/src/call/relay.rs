//! Turns a call's event queue into a client-consumable push stream.
//!
//! The relay holds the queue's single consumer end for the lifetime of one
//! stream connection and gives it back on drop, so a later sequential
//! attach resumes from the first undelivered event. It forwards events
//! verbatim, closes after any terminal event, and synthesizes one `timeout`
//! error once accumulated idle time exceeds the overall stream timeout.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;

use callwire_core::{CallEvent, CallId};

use super::config::CallConfig;
use super::registry::{CallRecord, CallRegistry};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("call not found: {0}")]
    NotFound(CallId),
    /// The queue's consumer end is held by another open stream.
    #[error("stream already attached for call {0}")]
    Busy(CallId),
}

/// One open stream over a call's event queue.
#[derive(Debug)]
pub struct StreamRelay {
    record: Arc<CallRecord>,
    receiver: Option<mpsc::UnboundedReceiver<CallEvent>>,
    poll_interval: Duration,
    stream_timeout: Duration,
    idle: Duration,
    closed: bool,
}

impl StreamRelay {
    /// Attaches to a call's queue.
    ///
    /// # Errors
    ///
    /// Fails when the call does not exist, or when another stream already
    /// holds the queue's consumer end.
    pub fn open(
        registry: &CallRegistry,
        call_id: &CallId,
        config: &CallConfig,
    ) -> Result<Self, RelayError> {
        let record = registry
            .get(call_id)
            .ok_or_else(|| RelayError::NotFound(call_id.clone()))?;
        let receiver = record
            .queue()
            .take_receiver()
            .ok_or_else(|| RelayError::Busy(call_id.clone()))?;

        counter!("callwire_streams_opened_total").increment(1);
        tracing::info!(call_id = %call_id, "stream opened");

        Ok(Self {
            record,
            receiver: Some(receiver),
            poll_interval: config.stream_poll_interval,
            stream_timeout: config.stream_timeout,
            idle: Duration::ZERO,
            closed: false,
        })
    }

    /// Waits for the next event to forward, polling the queue at the idle
    /// interval.
    ///
    /// Returns `None` once the relay is closed: after forwarding a terminal
    /// event, after the synthesized timeout error, or when the call's queue
    /// is gone. Idle time accumulates across the whole stream life; it is
    /// not reset by intervening events.
    pub async fn next_event(&mut self) -> Option<CallEvent> {
        if self.closed {
            return None;
        }
        let receiver = self.receiver.as_mut()?;

        loop {
            match timeout(self.poll_interval, receiver.recv()).await {
                Ok(Some(event)) => {
                    if event.is_terminal() {
                        self.closed = true;
                        tracing::info!(
                            call_id = %self.record.id,
                            reason = event.event_name(),
                            "stream closed"
                        );
                    }
                    return Some(event);
                }
                // Queue dropped out from under us (call evicted)
                Ok(None) => {
                    self.closed = true;
                    return None;
                }
                Err(_) => {
                    self.idle += self.poll_interval;
                    if self.idle > self.stream_timeout {
                        self.closed = true;
                        counter!("callwire_stream_timeouts_total").increment(1);
                        tracing::warn!(call_id = %self.record.id, "stream timed out");
                        return Some(CallEvent::Error {
                            message: "timeout".to_owned(),
                        });
                    }
                }
            }
        }
    }

    /// The call this relay is attached to.
    #[must_use]
    pub fn call_id(&self) -> &CallId {
        &self.record.id
    }
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            self.record.queue().restore_receiver(receiver);
        }
        counter!("callwire_streams_closed_total").increment(1);
    }
}
