//! HTTP forwarder that delivers chat messages to the automation webhook.

use std::time::Duration;

use crate::twitch::ChatMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_LOG_LIMIT: usize = 200;

/// Posts chat message payloads to one fixed webhook URL.
///
/// Delivery is at-most-once: failures of any kind are logged and dropped,
/// never retried and never raised to the chat-receive path.
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl WebhookForwarder {
    pub fn new(url: String, api_key: String) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    /// Issues a single POST for the message. Always returns; non-2xx
    /// statuses and transport failures are logged and swallowed.
    pub async fn forward(&self, message: &ChatMessage) {
        let response = self
            .client
            .post(&self.url)
            .header("X-API-Key", &self.api_key)
            .json(message)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                log::debug!("forwarded message from {} to webhook", message.username);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                log::warn!(
                    "webhook returned {}: {}",
                    status,
                    truncate(&body, BODY_LOG_LIMIT)
                );
            }
            Err(e) => {
                log::error!("webhook request failed: {}", e);
            }
        }
    }
}

/// Truncates to at most `limit` characters, respecting char boundaries.
fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
