//! Risk persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type RiskResult<T> = Result<T, RiskError>;
