// Metric and reading domain models
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

/// Sensor metrics reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MetricKind {
    Temperature,
    Humidity,
    Formaldehyde,
    #[serde(rename = "PM2_5")]
    Pm2_5,
    #[serde(rename = "CO")]
    Co,
}

impl MetricKind {
    pub const COUNT: usize = 5;

    /// All metrics, in display order.
    pub const ALL: [MetricKind; Self::COUNT] = [
        MetricKind::Temperature,
        MetricKind::Humidity,
        MetricKind::Formaldehyde,
        MetricKind::Pm2_5,
        MetricKind::Co,
    ];

    /// Token used on the wire and in the persisted file.
    pub fn token(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temp",
            MetricKind::Humidity => "humi",
            MetricKind::Formaldehyde => "ch2o",
            MetricKind::Pm2_5 => "pm2.5",
            MetricKind::Co => "co",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Temperature => "TEMP",
            MetricKind::Humidity => "HUMI",
            MetricKind::Formaldehyde => "CH2O",
            MetricKind::Pm2_5 => "PM2.5",
            MetricKind::Co => "CO",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::Humidity => "%",
            MetricKind::Formaldehyde => "mg/m³",
            MetricKind::Pm2_5 => "μg/m³",
            MetricKind::Co => "ppm",
        }
    }

    /// Look up a metric by its exact (case-sensitive) wire token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.token() == token)
    }

    /// Index into fixed per-metric arrays.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A single decoded sensor reading. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub metric: MetricKind,
    pub value: f64,
    pub is_warning: bool,
    pub timestamp: DateTime<Local>,
}

impl Reading {
    pub fn new(metric: MetricKind, value: f64, is_warning: bool) -> Self {
        Self::at(metric, value, is_warning, Local::now())
    }

    pub fn at(metric: MetricKind, value: f64, is_warning: bool, timestamp: DateTime<Local>) -> Self {
        Self {
            metric,
            value,
            is_warning,
            timestamp,
        }
    }
}
