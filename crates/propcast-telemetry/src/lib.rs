//! Structured logging for the propcast service.

pub mod logging;

pub use logging::{init_logging, TelemetryError};
