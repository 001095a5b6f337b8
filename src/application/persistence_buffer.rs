// Persistence buffer - Queues readings and flushes them to a durable sink
use crate::application::record_sink::{PersistenceError, RecordSink};
use crate::domain::metric::Reading;
use crate::domain::telemetry::PersistenceRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Append-only queue of records awaiting the sink.
///
/// Delivery is at-least-once-until-success: a failed flush keeps every queued
/// record for the next attempt. Nothing bounds the queue while the sink keeps
/// failing.
pub struct PersistenceBuffer {
    queue: Mutex<Vec<PersistenceRecord>>,
    last_flush: Mutex<Instant>,
    flush_interval: Duration,
    flush_lock: tokio::sync::Mutex<()>,
    flush_due: AtomicBool,
}

impl PersistenceBuffer {
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            flush_interval,
            flush_lock: tokio::sync::Mutex::new(()),
            flush_due: AtomicBool::new(false),
        }
    }

    /// Queue a reading. Returns true when more than the flush interval has
    /// passed since the last successful flush and no flush is already due;
    /// the caller should then flush.
    ///
    /// Only a successful flush restarts the interval, so after a failure the
    /// next reading asks for another attempt.
    pub fn record(&self, reading: &Reading) -> bool {
        self.queue().push(PersistenceRecord::from(reading));

        let overdue = lock(&self.last_flush).elapsed() > self.flush_interval;
        overdue
            && self
                .flush_due
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Copy of the queued records, oldest first.
    pub fn pending(&self) -> Vec<PersistenceRecord> {
        self.queue().clone()
    }

    /// Write every queued record to `sink` in arrival order.
    ///
    /// Records are removed only after the sink reports success. Records queued
    /// while the write is in flight stay queued for the next flush.
    pub async fn flush(&self, sink: &dyn RecordSink) -> Result<usize, PersistenceError> {
        let _flushing = self.flush_lock.lock().await;
        let result = self.write_pending(sink).await;
        // Success or not, the next overdue reading may ask again
        self.flush_due.store(false, Ordering::Release);
        result
    }

    async fn write_pending(&self, sink: &dyn RecordSink) -> Result<usize, PersistenceError> {
        let batch = self.pending();
        if batch.is_empty() {
            *lock(&self.last_flush) = Instant::now();
            return Ok(0);
        }

        if let Err(e) = sink.append(&batch).await {
            tracing::error!(
                "Flush of {} records failed, keeping them queued: {}",
                batch.len(),
                e
            );
            return Err(e);
        }

        self.queue().drain(..batch.len());
        *lock(&self.last_flush) = Instant::now();
        tracing::info!("Flushed {} records", batch.len());
        Ok(batch.len())
    }

    fn queue(&self) -> MutexGuard<'_, Vec<PersistenceRecord>> {
        lock(&self.queue)
    }
}

impl Default for PersistenceBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::record_sink::testing::MemorySink;
    use crate::domain::metric::MetricKind;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Sink that holds every append until released.
    #[derive(Default)]
    struct GatedSink {
        entered: Notify,
        release: Notify,
        rows: MemorySink,
    }

    #[async_trait]
    impl RecordSink for GatedSink {
        async fn append(&self, records: &[PersistenceRecord]) -> Result<(), PersistenceError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.rows.append(records).await
        }
    }

    fn readings() -> Vec<Reading> {
        vec![
            Reading::new(MetricKind::Temperature, 23.5, false),
            Reading::new(MetricKind::Humidity, 55.0, false),
            Reading::new(MetricKind::Pm2_5, 40.0, true),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_due_after_interval() {
        let buffer = PersistenceBuffer::default();
        let sink = MemorySink::default();
        let [first, second, third]: [Reading; 3] = readings().try_into().unwrap();

        assert!(!buffer.record(&first));
        assert!(!buffer.record(&second));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(buffer.record(&third));

        let written = buffer.flush(&sink).await.unwrap();
        assert_eq!(written, 3);
        assert!(buffer.is_empty());

        let metrics: Vec<MetricKind> = sink.rows().iter().map(|r| r.metric).collect();
        assert_eq!(
            metrics,
            vec![MetricKind::Temperature, MetricKind::Humidity, MetricKind::Pm2_5]
        );
        assert!(sink.rows()[2].warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_fires_once_per_interval() {
        let buffer = PersistenceBuffer::default();
        let sink = MemorySink::default();
        let reading = Reading::new(MetricKind::Co, 2.0, false);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(buffer.record(&reading));
        // Already due, the pending flush covers this one
        assert!(!buffer.record(&reading));
        assert_eq!(buffer.flush(&sink).await.unwrap(), 2);

        assert!(!buffer.record(&reading));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!buffer.record(&reading));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(buffer.record(&reading));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_is_retried_on_next_reading() {
        let buffer = PersistenceBuffer::default();
        let sink = MemorySink::failing();
        let reading = Reading::new(MetricKind::Co, 2.0, false);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(buffer.record(&reading));
        assert!(buffer.flush(&sink).await.is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        sink.set_failing(false);
        assert!(buffer.record(&reading));
        assert_eq!(buffer.flush(&sink).await.unwrap(), 2);

        // A successful flush restarts the interval
        assert!(!buffer.record(&reading));
        assert_eq!(sink.rows().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_interval_is_not_due() {
        let buffer = PersistenceBuffer::default();
        tokio::time::advance(DEFAULT_FLUSH_INTERVAL).await;
        assert!(!buffer.record(&Reading::new(MetricKind::Co, 2.0, false)));
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_records() {
        let buffer = PersistenceBuffer::default();
        let sink = MemorySink::failing();
        for reading in readings() {
            buffer.record(&reading);
        }

        let result = buffer.flush(&sink).await;
        assert!(matches!(result, Err(PersistenceError::PermissionDenied { .. })));
        assert_eq!(buffer.len(), 3);
        assert!(sink.rows().is_empty());

        sink.set_failing(false);
        assert_eq!(buffer.flush(&sink).await.unwrap(), 3);
        assert!(buffer.is_empty());
        assert_eq!(sink.rows().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_flush_writes_nothing() {
        let buffer = PersistenceBuffer::default();
        let sink = MemorySink::failing();
        assert_eq!(buffer.flush(&sink).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_removes_only_written_records() {
        let buffer = PersistenceBuffer::default();
        let sink = MemorySink::default();
        buffer.record(&Reading::new(MetricKind::Co, 1.0, false));
        buffer.flush(&sink).await.unwrap();
        buffer.record(&Reading::new(MetricKind::Co, 2.0, false));

        assert_eq!(buffer.pending().len(), 1);
        assert_eq!(buffer.pending()[0].value, 2.0);
        assert_eq!(sink.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_record_during_flush_is_kept() {
        let buffer = PersistenceBuffer::default();
        let sink = GatedSink::default();
        buffer.record(&Reading::new(MetricKind::Co, 1.0, false));

        let concurrent = async {
            sink.entered.notified().await;
            buffer.record(&Reading::new(MetricKind::Co, 2.0, false));
            sink.release.notify_one();
        };
        let (written, ()) = tokio::join!(buffer.flush(&sink), concurrent);

        assert_eq!(written.unwrap(), 1);
        let rows = sink.rows.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 1.0);
        let pending = buffer.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, 2.0);
    }
}
