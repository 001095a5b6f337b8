// Handler trait for readings decoded off the wire
use crate::domain::metric::Reading;

/// Receives decoded readings from the connection's receive loop.
///
/// Called on the receive task; implementations must not block.
pub trait ReadingHandler: Send + Sync {
    fn handle_readings(&self, readings: Vec<Reading>);
}
