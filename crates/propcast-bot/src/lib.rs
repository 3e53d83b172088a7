//! Service binary internals: configuration, orchestration, entry point.

pub mod config;
pub mod error;
pub mod service;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use service::SignalService;
