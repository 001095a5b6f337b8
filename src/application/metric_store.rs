// Metric store - Bounded rolling history per metric
use crate::domain::metric::{MetricKind, Reading};
use crate::domain::telemetry::{ChartSnapshot, SeriesData, TileData, TimeSeriesPoint};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of readings kept per metric.
pub const MAX_HISTORY: usize = 30;

/// Rolling history for every metric.
///
/// Each series sits behind its own lock, so a reader snapshotting one metric
/// never waits on an append to another.
pub struct MetricStore {
    capacity: usize,
    series: [RwLock<VecDeque<Reading>>; MetricKind::COUNT],
}

impl MetricStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            series: std::array::from_fn(|_| RwLock::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Append a reading, evicting the oldest entry once the series is full.
    pub fn append(&self, reading: Reading) {
        let mut series = self.write(reading.metric);
        if series.len() == self.capacity {
            series.pop_front();
        }
        series.push_back(reading);
    }

    /// Copy of the history for `metric`, oldest first.
    pub fn snapshot(&self, metric: MetricKind) -> Vec<Reading> {
        self.read(metric).iter().cloned().collect()
    }

    /// Most recent value for `metric`, or 0 before any reading arrived.
    pub fn current_value(&self, metric: MetricKind) -> f64 {
        self.latest(metric).map(|r| r.value).unwrap_or(0.0)
    }

    pub fn latest(&self, metric: MetricKind) -> Option<Reading> {
        self.read(metric).back().cloned()
    }

    /// Latest value of every metric that has reported at least once.
    pub fn latest_values(&self) -> HashMap<MetricKind, f64> {
        MetricKind::ALL
            .into_iter()
            .filter_map(|metric| self.latest(metric).map(|r| (metric, r.value)))
            .collect()
    }

    pub fn tiles(&self) -> Vec<TileData> {
        MetricKind::ALL
            .into_iter()
            .map(|metric| {
                let series = self.read(metric);
                match series.back() {
                    Some(r) => TileData::new(metric, r.value, r.is_warning, series.len()),
                    None => TileData::new(metric, 0.0, false, 0),
                }
            })
            .collect()
    }

    pub fn series(&self, metric: MetricKind) -> SeriesData {
        let points = self.snapshot(metric).iter().map(TimeSeriesPoint::from).collect();
        SeriesData::new(metric, points)
    }

    /// Every series, each copied under its own lock.
    pub fn chart_snapshot(&self) -> ChartSnapshot {
        ChartSnapshot::new(MetricKind::ALL.into_iter().map(|m| self.series(m)).collect())
    }

    // A poisoned lock only means a panic elsewhere mid-append; the deque itself is still valid.
    fn read(&self, metric: MetricKind) -> RwLockReadGuard<'_, VecDeque<Reading>> {
        self.series[metric.index()]
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, metric: MetricKind) -> RwLockWriteGuard<'_, VecDeque<Reading>> {
        self.series[metric.index()]
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}
