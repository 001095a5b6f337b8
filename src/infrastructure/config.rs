use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::metric_store::MAX_HISTORY;
use crate::infrastructure::frame_decoder::DEFAULT_MAX_PENDING;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub decoder: DecoderSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub read_chunk_size: usize,
}

impl DeviceSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".to_string(),
            port: 8080,
            connect_timeout_ms: 5_000,
            retry_delay_ms: 5_000,
            read_chunk_size: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecoderSettings {
    pub max_pending_bytes: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            max_pending_bytes: DEFAULT_MAX_PENDING,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: MAX_HISTORY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub directory: PathBuf,
    pub file_name: String,
    pub flush_interval_secs: u64,
}

impl StorageSettings {
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            directory: home.join("AirQualityData"),
            file_name: "air_quality_data.csv".to_string(),
            flush_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load `config/telemetry.*` (optional) overlaid with `AQ_*` environment variables,
/// e.g. `AQ_DEVICE__HOST=10.0.0.7`.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from("config/telemetry")
}

pub fn load_settings_from(base_name: &str) -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(base_name).required(false))
        .add_source(
            config::Environment::with_prefix("AQ")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
