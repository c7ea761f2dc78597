//! Outbound notifications. No teacher module covers this domain, so this
//! stays thin: one webhook implementation posting a JSON body, following
//! the same `reqwest` client-once/reuse shape as the other adapters.

use std::time::Duration;

use async_trait::async_trait;
use mf_engine::ports::{AdapterError, NotificationDispatcher};
use serde::Serialize;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_USER_AGENT: &str = "mediaforge/1.0";

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

pub struct WebhookNotificationDispatcher {
    client: reqwest::Client,
}

impl WebhookNotificationDispatcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotificationDispatcher {
    async fn notify(&self, sink: &str, message: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(sink)
            .json(&WebhookPayload { text: message })
            .send()
            .await
            .map_err(|e| AdapterError::TransientNetwork(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::ServiceUnavailable(format!(
                "webhook {sink} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
