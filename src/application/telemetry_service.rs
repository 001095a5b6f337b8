// Telemetry service - Fans decoded readings out to history, analysis and storage
use crate::application::analysis_engine::analyze;
use crate::application::metric_store::MetricStore;
use crate::application::persistence_buffer::PersistenceBuffer;
use crate::application::reading_handler::ReadingHandler;
use crate::application::record_sink::{PersistenceError, RecordSink};
use crate::domain::air_quality::AirQualityReport;
use crate::domain::connection::ConnectionState;
use crate::domain::metric::{MetricKind, Reading};
use crate::domain::telemetry::{ChartSnapshot, ReadingEvent, SeriesData, TileData};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared state between the receive loop and the presentation layer.
pub struct TelemetryService {
    store: MetricStore,
    persistence: Arc<PersistenceBuffer>,
    sink: Arc<dyn RecordSink>,
    analysis: RwLock<AirQualityReport>,
    events: broadcast::Sender<ReadingEvent>,
    connection: watch::Receiver<ConnectionState>,
}

impl TelemetryService {
    pub fn new(
        store: MetricStore,
        persistence: PersistenceBuffer,
        sink: Arc<dyn RecordSink>,
        connection: watch::Receiver<ConnectionState>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            persistence: Arc::new(persistence),
            sink,
            analysis: RwLock::new(analyze(&HashMap::new())),
            events,
            connection,
        }
    }

    /// Reading events, one per decoded reading. Slow subscribers skip events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReadingEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.borrow().clone()
    }

    pub fn history(&self, metric: MetricKind) -> SeriesData {
        self.store.series(metric)
    }

    pub fn current_value(&self, metric: MetricKind) -> f64 {
        self.store.current_value(metric)
    }

    pub fn tiles(&self) -> Vec<TileData> {
        self.store.tiles()
    }

    pub fn chart_snapshot(&self) -> ChartSnapshot {
        self.store.chart_snapshot()
    }

    pub fn analysis(&self) -> AirQualityReport {
        self.analysis
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn analysis_text(&self) -> String {
        self.analysis().to_string()
    }

    pub fn pending_records(&self) -> usize {
        self.persistence.len()
    }

    pub fn has_pending_records(&self) -> bool {
        !self.persistence.is_empty()
    }

    /// Flush every buffered record now, regardless of the timer.
    pub async fn export(&self) -> Result<usize, PersistenceError> {
        self.persistence.flush(self.sink.as_ref()).await
    }

    fn refresh_analysis(&self) {
        let report = analyze(&self.store.latest_values());
        *self
            .analysis
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = report;
    }

    fn schedule_flush(&self) {
        let persistence = self.persistence.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            // Failures are logged by the buffer and the records stay queued
            let _ = persistence.flush(sink.as_ref()).await;
        });
    }
}

impl ReadingHandler for TelemetryService {
    fn handle_readings(&self, readings: Vec<Reading>) {
        if readings.is_empty() {
            return;
        }

        let mut flush_due = false;
        for reading in readings {
            flush_due |= self.persistence.record(&reading);
            // No subscribers is fine
            let _ = self.events.send(ReadingEvent::from(&reading));
            self.store.append(reading);
        }

        self.refresh_analysis();
        if flush_due {
            self.schedule_flush();
        }
    }
}
