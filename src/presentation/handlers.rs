// HTTP request handlers
use crate::domain::air_quality::AirQualityReport;
use crate::domain::connection::ConnectionState;
use crate::domain::metric::MetricKind;
use crate::domain::telemetry::{ChartSnapshot, ReadingEvent, SeriesData, TileData};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{Response, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub text: String,
    pub report: AirQualityReport,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub rows: usize,
}

#[derive(Debug, Serialize)]
pub struct CurrentValueResponse {
    pub metric: MetricKind,
    pub value: f64,
    pub unit: &'static str,
}

/// Health check endpoint; the service stays healthy while the device is away
pub async fn health_check(State(state): State<Arc<AppState>>) -> &'static str {
    if state.telemetry.connection_state().is_connected() {
        "ok"
    } else {
        "ok (device offline)"
    }
}

pub async fn connection_state(State(state): State<Arc<AppState>>) -> Json<ConnectionState> {
    Json(state.telemetry.connection_state())
}

/// Latest value of every metric
pub async fn list_metrics(State(state): State<Arc<AppState>>) -> Json<Vec<TileData>> {
    Json(state.telemetry.tiles())
}

/// Most recent value of one metric, 0 before the first reading
pub async fn current_value(
    Path(token): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<CurrentValueResponse>, StatusCode> {
    let metric = MetricKind::from_token(&token).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(CurrentValueResponse {
        metric,
        value: state.telemetry.current_value(metric),
        unit: metric.unit(),
    }))
}

/// Rolling history for one metric, addressed by its wire token (e.g. `pm2.5`)
pub async fn metric_history(
    Path(token): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SeriesData>, StatusCode> {
    let metric = MetricKind::from_token(&token).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(state.telemetry.history(metric)))
}

pub async fn analysis(State(state): State<Arc<AppState>>) -> Json<AnalysisResponse> {
    let report = state.telemetry.analysis();
    Json(AnalysisResponse {
        text: report.to_string(),
        report,
    })
}

/// The analysis as display text
pub async fn analysis_text(State(state): State<Arc<AppState>>) -> String {
    state.telemetry.analysis_text()
}

/// Every series at once, for an external chart renderer
pub async fn chart_snapshot(State(state): State<Arc<AppState>>) -> Json<ChartSnapshot> {
    Json(state.telemetry.chart_snapshot())
}

/// Flush buffered readings to the CSV file now
pub async fn export(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExportResponse>, (StatusCode, String)> {
    match state.telemetry.export().await {
        Ok(rows) => Ok(Json(ExportResponse { rows })),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Stream reading events as newline-delimited JSON
pub async fn stream_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let events = state.telemetry.subscribe();
    let body = Body::from_stream(event_stream(events, state.shutdown.clone()));

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
    {
        Ok(response) => response,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn event_stream(
    mut rx: broadcast::Receiver<ReadingEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        loop {
            let next = tokio::select! {
                next = rx.recv() => next,
                _ = shutdown_requested(&mut shutdown) => break,
            };
            match next {
                Ok(event) => match serde_json::to_vec(&event) {
                    Ok(mut line) => {
                        line.push(b'\n');
                        yield Ok(Bytes::from(line));
                    }
                    Err(e) => tracing::warn!("Could not serialize reading event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
