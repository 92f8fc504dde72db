//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the binary to wire shared state
//! (engine, metrics) between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use super::auth::require_bearer;
use super::config::NetworkConfig;
use super::handlers::{
    cancel_all_handler, cancel_handler, execute_handler, healthz_handler, manifest_handler,
    metrics_handler, readyz_handler, session_events_handler, stream_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::call::CallEngine;

/// How long drain waits for cancelled units of work to exit.
const UNIT_DRAIN_GRACE: Duration = Duration::from_secs(10);
/// How long drain waits for attached streams to flush terminal events.
const STREAM_DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- takes the wired call engine and allocates shared state
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
///
/// The engine and shutdown controller are shared via `Arc` so the binary
/// can reference them after construction.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    engine: CallEngine,
    shutdown: Arc<ShutdownController>,
    metrics: Option<PrometheusHandle>,
    provider_configured: bool,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        engine: CallEngine,
        metrics: Option<PrometheusHandle>,
        provider_configured: bool,
    ) -> Self {
        Self {
            config,
            listener: None,
            engine,
            shutdown: Arc::new(ShutdownController::new()),
            metrics,
            provider_configured,
        }
    }

    /// Returns a handle to the call engine.
    #[must_use]
    pub fn engine(&self) -> CallEngine {
        self.engine.clone()
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            engine: self.engine.clone(),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            metrics: self.metrics.clone(),
            provider_configured: self.provider_configured,
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Bearer-authenticated routes:
    /// - `POST /execute` -- admit a call
    /// - `GET /stream/{call_id}` -- SSE event relay
    /// - `POST /cancel/{call_id}`, `POST /cancel_all` -- cancellation
    /// - `GET /manifest` -- operation catalog
    /// - `GET /sessions/{session_id}/events` -- session milestones
    ///
    /// Unauthenticated routes: `GET /healthz`, `GET /readyz`, `GET /metrics`.
    ///
    /// The request timeout wraps every authenticated route except the
    /// stream, which must be allowed to stay open for the relay window.
    pub fn build_router(&self) -> Router {
        let state = self.app_state();
        let auth_state = Arc::clone(&state.config);

        let guarded = Router::new()
            .route("/execute", post(execute_handler))
            .route("/cancel/{call_id}", post(cancel_handler))
            .route("/cancel_all", post(cancel_all_handler))
            .route("/manifest", get(manifest_handler))
            .route("/sessions/{session_id}/events", get(session_events_handler))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.request_timeout,
            ))
            .route("/stream/{call_id}", get(stream_handler))
            .layer(middleware::from_fn_with_state(auth_state, require_bearer));

        Router::new()
            .merge(guarded)
            .route("/healthz", get(healthz_handler))
            .route("/readyz", get(readyz_handler))
            .route("/metrics", get(metrics_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining
    /// 2. Every live call is cancelled and its unit of work reaped
    /// 3. Open event streams flush their terminal events and close
    /// 4. Health state transitions to Stopped
    ///
    /// Cancellation runs *before* the listener stops waiting on open
    /// connections, so attached streams receive their `cancelled` events
    /// instead of blocking shutdown for the full relay window.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();

        let engine = self.engine.clone();
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let drain_ctrl = Arc::clone(&self.shutdown);

        // Cancellations must land before the server starts waiting on open
        // connections, so the drain begins inside the shutdown future.
        let graceful = async move {
            shutdown.await;
            begin_drain(&engine, &drain_ctrl).await;
        };

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();

        if let Some(tls_config) = self.config.tls.clone() {
            serve_tls(listener, router, &tls_config, &shutdown_ctrl, graceful).await
        } else {
            serve_plain(listener, router, &shutdown_ctrl, graceful).await
        }
    }
}

/// Serves plain HTTP connections using axum's built-in server.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown_ctrl: &ShutdownController,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP connections");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    finish_drain(shutdown_ctrl).await;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &super::config::TlsConfig,
    shutdown_ctrl: &ShutdownController,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    // Wait for the shutdown signal (and the engine drain it performs), then
    // stop the axum-server accept loop gracefully.
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    finish_drain(shutdown_ctrl).await;
    Ok(())
}

/// Claims a terminal state for every live call, then waits for their units
/// of work to exit.
async fn begin_drain(engine: &CallEngine, shutdown_ctrl: &ShutdownController) {
    shutdown_ctrl.trigger_shutdown();

    let claimed = engine.cancel_all();
    if !claimed.is_empty() {
        info!("Cancelling {} live calls for shutdown", claimed.len());
    }

    if !engine.wait_idle(UNIT_DRAIN_GRACE).await {
        warn!("Drain grace expired with units of work still running");
    }
}

/// Waits for attached stream consumers to close and transitions to Stopped.
async fn finish_drain(shutdown_ctrl: &ShutdownController) {
    if shutdown_ctrl.wait_for_drain(STREAM_DRAIN_GRACE).await {
        info!("All event streams drained successfully");
    } else {
        warn!("Drain timeout expired with streams still attached");
    }
}
