//! Transport error types.

use thiserror::Error;

/// Streaming session failure. Surfaced to the source manager, which drives
/// failover and reconnection with backoff.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("stream closed: {0}")]
    Closed(String),

    #[error("read deadline expired after {0}ms")]
    ReadDeadline(u64),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

/// REST request failure.
///
/// `Transport` covers network errors, timeouts, and non-success statuses;
/// `Decode` covers payload shape mismatches.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
