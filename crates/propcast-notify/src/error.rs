//! Notification error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Required chat credentials missing at startup. Fatal: the service's
    /// only user-visible success surface is the notification channel.
    #[error("notification credentials missing (bot token / chat id)")]
    MissingCredentials,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("chat API returned HTTP {0}")]
    Status(u16),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
