// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod connection_manager;
pub mod csv_sink;
pub mod frame_decoder;
