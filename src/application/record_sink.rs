// Sink trait for durable storage of readings
use crate::domain::telemetry::PersistenceRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("permission denied writing {path}; is the file open elsewhere?")]
    PermissionDenied { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append records in order. On error, none of them count as persisted.
    async fn append(&self, records: &[PersistenceRecord]) -> Result<(), PersistenceError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory sink that can be switched into a failing mode.
    #[derive(Default)]
    pub struct MemorySink {
        pub rows: Mutex<Vec<PersistenceRecord>>,
        failing: AtomicBool,
    }

    impl MemorySink {
        pub fn failing() -> Self {
            let sink = Self::default();
            sink.set_failing(true);
            sink
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn rows(&self) -> Vec<PersistenceRecord> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn append(&self, records: &[PersistenceRecord]) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistenceError::PermissionDenied {
                    path: "memory".to_string(),
                });
            }
            self.rows.lock().unwrap().extend_from_slice(records);
            Ok(())
        }
    }
}
