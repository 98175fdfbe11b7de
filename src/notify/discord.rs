use super::transport::{NotificationTransport, WebhookPayload};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Discord rejects message content longer than this many characters.
const MAX_CONTENT_CHARS: usize = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DiscordWebhook {
    client: Client,
}

impl DiscordWebhook {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pg-xz-backup/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationTransport for DiscordWebhook {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        let mut payload = payload.clone();
        payload.content = truncate_content(&payload.content);

        let response = self.client.post(url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackupError::Notification(format!(
                "Webhook responded with {} - {}",
                status, text
            )));
        }

        debug!("Webhook accepted message ({})", response.status());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Discord Webhook"
    }
}

fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(MAX_CONTENT_CHARS - 1).collect();
    truncated.push('…');
    truncated
}
