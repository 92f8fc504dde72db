//! Call lifecycle engine: registry, execution, cancellation, relay, history.

pub mod config;
pub mod controller;
pub mod engine;
pub mod history;
pub mod ops;
pub mod queue;
pub mod registry;
pub mod relay;
pub mod supervisor;

pub use config::CallConfig;
pub use controller::{CancelError, CancellationController};
pub use engine::{Admission, CallEngine};
pub use history::SessionHistory;
pub use queue::EventQueue;
pub use registry::{BeginOutcome, CallOutcome, CallRecord, CallRegistry, NewCall};
pub use relay::{RelayError, StreamRelay};
pub use supervisor::ExecutionSupervisor;
