// Application state for HTTP handlers
use crate::application::telemetry_service::TelemetryService;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<TelemetryService>,
    /// Turns true once the service is shutting down; ends open event streams.
    pub shutdown: watch::Receiver<bool>,
}
