use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Body of a webhook message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl WebhookPayload {
    /// Blank display names and icons are dropped rather than sent empty.
    pub fn new(content: &str, username: Option<&str>, avatar_url: Option<&str>) -> Self {
        let non_blank = |s: Option<&str>| s.filter(|s| !s.trim().is_empty()).map(str::to_string);
        Self {
            content: content.to_string(),
            username: non_blank(username),
            avatar_url: non_blank(avatar_url),
        }
    }
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> Result<()>;
    fn name(&self) -> &'static str;
}
