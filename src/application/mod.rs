// Application layer - Services and the seams they depend on
pub mod analysis_engine;
pub mod metric_store;
pub mod persistence_buffer;
pub mod reading_handler;
pub mod record_sink;
pub mod telemetry_service;
