// Presentation layer - HTTP surface for dashboards and UIs
pub mod app_state;
pub mod handlers;
