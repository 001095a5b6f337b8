// Telemetry data domain models
use super::metric::{MetricKind, Reading};
use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

impl From<&Reading> for TimeSeriesPoint {
    fn from(reading: &Reading) -> Self {
        Self::new(reading.timestamp.timestamp_millis(), reading.value)
    }
}

/// Latest value of one metric, as shown on a tile.
#[derive(Debug, Clone, Serialize)]
pub struct TileData {
    pub metric: MetricKind,
    pub label: &'static str,
    pub unit: &'static str,
    pub value: f64,
    pub is_warning: bool,
    pub samples: usize,
}

impl TileData {
    pub fn new(metric: MetricKind, value: f64, is_warning: bool, samples: usize) -> Self {
        Self {
            metric,
            label: metric.label(),
            unit: metric.unit(),
            value,
            is_warning,
            samples,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesData {
    pub metric: MetricKind,
    pub name: &'static str,
    pub unit: &'static str,
    pub points: Vec<TimeSeriesPoint>,
}

impl SeriesData {
    pub fn new(metric: MetricKind, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            metric,
            name: metric.label(),
            unit: metric.unit(),
            points,
        }
    }
}

/// Every series at one instant, handed to an external chart renderer.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub title: &'static str,
    pub series: Vec<SeriesData>,
}

impl ChartSnapshot {
    pub fn new(series: Vec<SeriesData>) -> Self {
        Self {
            title: "Air Quality Chart",
            series,
        }
    }
}

/// Event published for every decoded reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingEvent {
    pub metric: MetricKind,
    pub value: f64,
    pub is_warning: bool,
    pub time_ms: i64,
}

impl From<&Reading> for ReadingEvent {
    fn from(reading: &Reading) -> Self {
        Self {
            metric: reading.metric,
            value: reading.value,
            is_warning: reading.is_warning,
            time_ms: reading.timestamp.timestamp_millis(),
        }
    }
}

/// A reading queued for the durable sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceRecord {
    pub timestamp: DateTime<Local>,
    pub metric: MetricKind,
    pub value: f64,
    pub warning: bool,
}

impl From<&Reading> for PersistenceRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            metric: reading.metric,
            value: reading.value,
            warning: reading.is_warning,
        }
    }
}
