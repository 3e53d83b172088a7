//! Chat notifier over the Telegram bot API.

use crate::error::NotifyError;
use propcast_core::ProposalCard;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::info;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Sends proposal cards to a chat channel.
pub struct Notifier {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    /// Credentials are required: without a chat channel the service has no
    /// user-visible output, so missing values are a startup error.
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        Self::with_api_base("https://api.telegram.org", bot_token, chat_id)
    }

    pub fn with_api_base(
        api_base: &str,
        bot_token: &str,
        chat_id: &str,
    ) -> Result<Self, NotifyError> {
        if bot_token.is_empty() || chat_id.is_empty() {
            return Err(NotifyError::MissingCredentials);
        }
        let http = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    /// Deliver one card; `html_text` is the pre-rendered message body.
    pub async fn send_card(
        &self,
        card: &ProposalCard,
        html_text: &str,
    ) -> Result<Option<i64>, NotifyError> {
        let endpoint = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let started = Instant::now();
        let response = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": html_text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        let body: SendMessageResponse = response.json().await?;
        if !body.ok {
            return Err(NotifyError::Transport("chat API replied ok=false".to_string()));
        }

        let message_id = body.result.map(|m| m.message_id);
        info!(
            symbol = %card.symbol,
            strategy = %card.strategy,
            message_id,
            latency_ms = started.elapsed().as_millis() as u64,
            "card sent to chat"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_are_fatal() {
        assert!(matches!(
            Notifier::new("", "12345"),
            Err(NotifyError::MissingCredentials)
        ));
        assert!(matches!(
            Notifier::new("token", ""),
            Err(NotifyError::MissingCredentials)
        ));
        assert!(Notifier::new("token", "12345").is_ok());
    }

    #[test]
    fn response_payload_decodes() {
        let body: SendMessageResponse =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":42,"date":1}}"#).unwrap();
        assert!(body.ok);
        assert_eq!(body.result.unwrap().message_id, 42);
    }
}
