use super::transport::{NotificationTransport, WebhookPayload};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// Keeps every delivered payload in memory.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, WebhookPayload)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, WebhookPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, p)| p.content).collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct FailingTransport;

#[async_trait]
impl NotificationTransport for FailingTransport {
    async fn deliver(&self, _url: &str, _payload: &WebhookPayload) -> Result<()> {
        Err(BackupError::Notification("503 Service Unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
