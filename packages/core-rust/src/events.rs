//! Wire schemas for streamed call events and session milestones.
//!
//! `CallEvent` is what flows through a call's event queue and out over SSE;
//! `SessionEvent` is the summarized milestone mirrored into a session's
//! bounded history buffer. Both are internally tagged JSON so clients can
//! dispatch on a single discriminant field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::CallId;

/// One unit pushed through a call's event queue.
///
/// Within one call the stream is causal: any number of `Partial` events
/// followed by exactly one terminal event (`Final`, `Error`, or `Cancelled`),
/// which is always the last event on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallEvent {
    /// One incremental text fragment from the provider.
    Partial { text: String },
    /// Successful completion; `text` is the full accumulated output.
    Final { text: String },
    /// The unit of work failed; carries the captured failure message.
    Error { message: String },
    /// The unit of work was cancelled cooperatively.
    Cancelled { message: String },
}

impl CallEvent {
    /// The SSE event name, identical to the JSON `type` discriminant.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Partial { .. } => "partial",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this event closes the stream it is delivered on.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Partial { .. })
    }
}

/// A lifecycle milestone recorded into a session's history buffer.
///
/// Unlike `CallEvent`, milestones summarize whole transitions: one
/// `ToolStarted` when the unit of work begins, then exactly one of
/// `ToolFinished`/`ToolError`/`ToolCancelled` for the terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ToolStarted {
        call_id: CallId,
        tool: String,
        input: Value,
    },
    ToolFinished {
        call_id: CallId,
        tool: String,
        output: String,
    },
    ToolError {
        call_id: CallId,
        tool: String,
        error: String,
    },
    ToolCancelled {
        call_id: CallId,
        message: String,
    },
}

impl SessionEvent {
    /// The call this milestone belongs to.
    #[must_use]
    pub fn call_id(&self) -> &CallId {
        match self {
            Self::ToolStarted { call_id, .. }
            | Self::ToolFinished { call_id, .. }
            | Self::ToolError { call_id, .. }
            | Self::ToolCancelled { call_id, .. } => call_id,
        }
    }
}
