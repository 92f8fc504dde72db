//! Callwire server — call lifecycle engine with an SSE relay over axum.

pub mod call;
pub mod config;
pub mod network;
pub mod provider;

pub use call::CallEngine;
pub use network::NetworkModule;
