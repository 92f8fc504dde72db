//! Callwire server binary.
//!
//! Wires the OpenAI-backed chat operation into a call engine, installs the
//! Prometheus recorder, and runs the HTTP server until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callwire_server::call::ops::{ChatOperation, OperationRegistry};
use callwire_server::call::CallEngine;
use callwire_server::config::ServerArgs;
use callwire_server::network::NetworkModule;
use callwire_server::provider::{OpenAiProvider, TextProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.log_json);

    info!("Starting callwire server");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let provider_config = args.provider_config();
    let provider: Arc<dyn TextProvider> =
        Arc::new(OpenAiProvider::new(provider_config.clone()));

    let mut operations = OperationRegistry::new();
    operations.register(Arc::new(ChatOperation::new(provider, &provider_config)));

    let engine = CallEngine::new(Arc::new(operations), args.call_config());

    let mut module = NetworkModule::new(
        args.network_config(),
        engine,
        Some(metrics),
        args.provider_configured(),
    );
    let port = module.start().await.context("failed to bind listener")?;
    info!(port, model = %provider_config.model, "Server listening");

    module.serve(shutdown_signal()).await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "callwire_server=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
