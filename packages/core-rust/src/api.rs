//! Request and response payloads for the HTTP surface.
//!
//! These are the only shapes that cross the process boundary as request or
//! response bodies; streamed messages use [`crate::events::CallEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::SessionEvent;
use crate::types::{CallId, CallStatus, RequestId, SessionId};

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Operation kind tag, dispatched against the handler registry.
    pub kind: String,
    /// Opaque structured input, interpreted by the selected handler.
    pub input: Value,
    /// Groups this call into a session's milestone history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Idempotency token; re-submission returns the original call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// Status reported by the execute endpoint.
///
/// `Started` is reported for newly created calls; idempotent replays report
/// the existing call's current lifecycle status instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteStatus {
    Started,
    Pending,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl From<CallStatus> for ExecuteStatus {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Pending => Self::Pending,
            CallStatus::Running => Self::Running,
            CallStatus::Finished => Self::Finished,
            CallStatus::Error => Self::Error,
            CallStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Response of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub call_id: CallId,
    pub status: ExecuteStatus,
}

/// Response of `POST /cancel/{call_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: CallStatus,
}

/// Response of `POST /cancel_all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAllResponse {
    pub status: CallStatus,
    pub count: usize,
    pub call_ids: Vec<CallId>,
}

/// Response of `GET /sessions/{session_id}/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventsResponse {
    pub session_id: SessionId,
    pub events: Vec<SessionEvent>,
}

/// One operation kind advertised by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub kind: String,
    pub description: String,
}

/// Response of `GET /manifest`: the server's operation catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub operations: Vec<OperationDescriptor>,
}

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// The inner error payload: human-readable message, stable machine code,
/// and the error's type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub error_code: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        error_code: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_code: error_code.into(),
                kind: kind.into(),
            },
        }
    }
}
