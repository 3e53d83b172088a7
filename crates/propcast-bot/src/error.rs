//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("init error: {0}")]
    Init(String),

    #[error(transparent)]
    Risk(#[from] propcast_risk::RiskError),

    #[error(transparent)]
    Notify(#[from] propcast_notify::NotifyError),
}

pub type AppResult<T> = Result<T, AppError>;
