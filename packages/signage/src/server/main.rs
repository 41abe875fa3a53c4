// Main entry point for the signage pipeline server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use signage_core::kernel::{InMemoryDeviceRegistry, PipelineDeps, SimulatedScorer, StreamHub};
use signage_core::pipeline::Pipeline;
use signage_core::server::build_app;
use signage_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,signage_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting signage pipeline server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        auto_approve = config.thresholds.auto_approve,
        auto_reject = config.thresholds.auto_reject,
        overflow = %config.event_bus_overflow,
        devices = config.devices.len(),
        "Configuration loaded"
    );

    // Collaborators: simulated scorer and in-memory device registry
    let scorer = SimulatedScorer::new(
        config.simulated_approval_rate,
        config.thresholds,
        config.simulated_scorer_latency,
    );
    let devices = InMemoryDeviceRegistry::with_active(config.devices.iter().copied());
    let deps = PipelineDeps::new(Arc::new(scorer), Arc::new(devices), StreamHub::new());

    let port = config.port;
    let handle = Pipeline::builder(config, deps).build().start();
    let app = build_app(handle.context().clone());

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown = handle.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    // Give in-flight scoring a bounded window to settle
    if tokio::time::timeout(Duration::from_secs(30), handle.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Pipeline did not stop within 30s");
    }

    Ok(())
}
