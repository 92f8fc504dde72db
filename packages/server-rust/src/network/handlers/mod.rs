//! HTTP handler definitions for the callwire server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod cancel;
pub mod execute;
pub mod health;
pub mod manifest;
pub mod sessions;
pub mod stream;

pub use cancel::{cancel_all_handler, cancel_handler};
pub use execute::execute_handler;
pub use health::{healthz_handler, metrics_handler, readyz_handler};
pub use manifest::manifest_handler;
pub use sessions::session_events_handler;
pub use stream::stream_handler;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use super::{NetworkConfig, ShutdownController};
use crate::call::CallEngine;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Call engine: registry, operation handlers, history, supervision.
    pub engine: CallEngine,
    /// Graceful shutdown controller with health state and open-stream tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, TLS, auth token).
    pub config: Arc<NetworkConfig>,
    /// Prometheus render handle; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Whether an upstream provider credential was supplied at startup.
    pub provider_configured: bool,
}
