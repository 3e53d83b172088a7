//! Optional JSON postback of dispatched cards.

use crate::error::NotifyError;
use propcast_core::ProposalCard;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const POST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire-and-forget card postback. Disabled when no URL is configured.
#[derive(Clone)]
pub struct PostbackClient {
    http: Client,
    url: Option<String>,
}

impl PostbackClient {
    pub fn new(url: Option<String>) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(POST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            url: url.filter(|u| !u.is_empty()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// POST the card as JSON. Failures are logged, never propagated to the
    /// dispatch pipeline.
    pub async fn post_json(&self, card: &ProposalCard) {
        let Some(url) = &self.url else {
            return;
        };
        let started = Instant::now();
        match self.http.post(url).json(card).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    symbol = %card.symbol,
                    http_status = response.status().as_u16(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "postback sent"
                );
            }
            Ok(response) => {
                warn!(
                    symbol = %card.symbol,
                    http_status = response.status().as_u16(),
                    "postback rejected"
                );
            }
            Err(e) => {
                warn!(symbol = %card.symbol, error = %e, "postback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_disables_postback() {
        assert!(!PostbackClient::new(None).unwrap().is_enabled());
        assert!(!PostbackClient::new(Some(String::new())).unwrap().is_enabled());
        assert!(PostbackClient::new(Some("http://localhost:9000/cards".to_string()))
            .unwrap()
            .is_enabled());
    }
}
