// CSV file sink for persisted readings
use crate::application::record_sink::{PersistenceError, RecordSink};
use crate::domain::telemetry::PersistenceRecord;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 4] = ["timestamp", "metric", "value", "warning"];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Appends records to a single CSV file, writing the header only into an empty file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn append(&self, records: &[PersistenceRecord]) -> Result<(), PersistenceError> {
        let path = self.path.clone();
        let records = records.to_vec();

        // File I/O runs on the blocking pool so the caller's runtime keeps going
        tokio::task::spawn_blocking(move || write_records(&path, &records))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

fn write_records(path: &Path, records: &[PersistenceRecord]) -> Result<(), PersistenceError> {
    let permission = |e: std::io::Error| match e.kind() {
        ErrorKind::PermissionDenied => PersistenceError::PermissionDenied {
            path: path.display().to_string(),
        },
        _ => PersistenceError::Io(e),
    };

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(permission)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(permission)?;
    let is_new = file.metadata().map_err(permission)?.len() == 0;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(HEADER)?;
    }
    for record in records {
        writer.write_record([
            record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            record.metric.token().to_string(),
            record.value.to_string(),
            if record.warning { "yes" } else { "no" }.to_string(),
        ])?;
    }
    writer.flush().map_err(permission)?;

    tracing::debug!("Appended {} rows to {}", records.len(), path.display());
    Ok(())
}
