// Main entry point - Dependency injection, device connection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use axum::{Router, routing::{get, post}};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::metric_store::MetricStore;
use crate::application::persistence_buffer::PersistenceBuffer;
use crate::application::telemetry_service::TelemetryService;
use crate::domain::connection::ConnectionState;
use crate::infrastructure::config::load_settings;
use crate::infrastructure::connection_manager::ConnectionManager;
use crate::infrastructure::csv_sink::CsvSink;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    analysis, analysis_text, chart_snapshot, connection_state, current_value, export, health_check,
    list_metrics, metric_history, stream_events,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = load_settings()?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.level)),
        )
        .init();

    // Durable sink (infrastructure layer)
    let sink = Arc::new(CsvSink::new(settings.storage.file_path()));
    tracing::info!("Persisting readings to {}", sink.path().display());

    // Shared state (application layer)
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let telemetry = Arc::new(TelemetryService::new(
        MetricStore::new(settings.history.capacity),
        PersistenceBuffer::new(settings.storage.flush_interval()),
        sink,
        state_rx,
    ));

    // Ctrl-C flips the shared shutdown flag
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
        shutdown_tx.send_replace(true);
    });

    // Device connection
    let manager = ConnectionManager::new(
        &settings.device,
        settings.decoder.max_pending_bytes,
        state_tx,
        telemetry.clone(),
    );
    let receiver = tokio::spawn(manager.run(shutdown_rx.clone()));

    // Build router (presentation layer)
    let state = Arc::new(AppState {
        telemetry: telemetry.clone(),
        shutdown: shutdown_rx.clone(),
    });
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/connection", get(connection_state))
        .route("/metrics", get(list_metrics))
        .route("/metrics/:metric", get(current_value))
        .route("/metrics/:metric/history", get(metric_history))
        .route("/analysis", get(analysis))
        .route("/analysis/text", get(analysis_text))
        .route("/chart", get(chart_snapshot))
        .route("/export", post(export))
        .route("/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(settings.server.bind).await?;
    tracing::info!("Starting air-quality-telemetry service on {}", settings.server.bind);

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    // Wait for the receive loop, then make a last attempt at persisting
    receiver.await?;
    if telemetry.has_pending_records() {
        match telemetry.export().await {
            Ok(rows) => tracing::info!("Final flush wrote {} rows", rows),
            Err(e) => tracing::error!(
                "Final flush failed, {} records not persisted: {}",
                telemetry.pending_records(),
                e
            ),
        }
    }

    Ok(())
}
