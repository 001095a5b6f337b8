// Domain layer - Plain data types shared by every other layer
pub mod air_quality;
pub mod connection;
pub mod metric;
pub mod telemetry;
