//! Callwire Core — call identities, lifecycle state machine, and wire schemas.

pub mod api;
pub mod events;
pub mod types;

pub use api::{
    CancelAllResponse, CancelResponse, ErrorBody, ExecuteRequest, ExecuteResponse, ExecuteStatus,
    Manifest, OperationDescriptor, SessionEventsResponse,
};
pub use events::{CallEvent, SessionEvent};
pub use types::{CallId, CallStatus, RequestId, SessionId};
