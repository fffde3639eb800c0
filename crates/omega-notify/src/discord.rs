use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::{Channel, NotifyError};

/// Discord incoming webhook.
pub struct DiscordChannel {
    client: Client,
    webhook_url: String,
}

impl DiscordChannel {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": text }))
            .send()
            .await
            // The webhook path is the credential.
            .map_err(|err| NotifyError::Http(err.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                channel: self.name(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
