//! Best-effort status messages to a webhook.
//!
//! A [`Notifier`] without a configured sink does nothing. Delivery failures
//! are logged and never returned to the caller.

mod discord;
mod transport;

#[cfg(test)]
pub mod testing;

pub use discord::DiscordWebhook;
pub use transport::{NotificationTransport, WebhookPayload};

use crate::config::NotificationConfig;
use std::sync::Arc;
use tracing::{debug, warn};

struct Target {
    sink: NotificationConfig,
    transport: Arc<dyn NotificationTransport>,
}

pub struct Notifier {
    target: Option<Target>,
}

impl Notifier {
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn with_transport(
        sink: Option<NotificationConfig>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            target: sink.map(|sink| Target { sink, transport }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Sends `message` if a sink is configured. Never fails.
    pub async fn notify(&self, message: &str) {
        let Some(target) = &self.target else {
            return;
        };

        let payload = WebhookPayload::new(
            message,
            target.sink.username.as_deref(),
            target.sink.avatar_url.as_deref(),
        );

        match target.transport.deliver(&target.sink.webhook_url, &payload).await {
            Ok(()) => debug!("Notification sent via {}", target.transport.name()),
            Err(e) => warn!(
                "Failed to send notification via {}: {}",
                target.transport.name(),
                e
            ),
        }
    }
}

/// Builds the notifier for the configured sink, falling back to a disabled
/// notifier when the HTTP client cannot be created.
pub fn create_notifier(sink: Option<&NotificationConfig>) -> Notifier {
    let Some(sink) = sink else {
        return Notifier::disabled();
    };

    match DiscordWebhook::new() {
        Ok(webhook) => Notifier::with_transport(Some(sink.clone()), Arc::new(webhook)),
        Err(e) => {
            warn!("Notifications disabled, HTTP client unavailable: {}", e);
            Notifier::disabled()
        }
    }
}
