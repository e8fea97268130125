// SPDX-License-Identifier: MPL-2.0

//! Notification dispatch

use crate::backends::analysis::classify_http_error;
use crate::errors::{GatewayError, GatewayResult};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, info};

/// Composed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    /// Reference to an image to attach
    pub attachment: Option<String>,
}

/// Delivers messages to a recipient
///
/// Delivery is best effort: a failure is reported to the caller but never
/// undoes the alert that triggered it.
pub trait NotificationGateway: Send + Sync {
    fn send<'a>(&'a self, recipient: &'a str, message: &'a Message) -> BoxFuture<'a, GatewayResult<()>>;
}

/// Writes notifications to the log only
pub struct LogNotifier;

impl NotificationGateway for LogNotifier {
    fn send<'a>(&'a self, recipient: &'a str, message: &'a Message) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            info!(
                recipient,
                subject = %message.subject,
                attachment = message.attachment.as_deref().unwrap_or("-"),
                "Notification"
            );
            debug!(body = %message.body, "Notification body");
            Ok(())
        })
    }
}

/// POSTs notifications as JSON to a webhook (mail relay, chat bridge, ...)
///
/// ```json
/// { "recipient": "...", "subject": "...", "body": "...", "attachment": "file://..." }
/// ```
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl NotificationGateway for WebhookNotifier {
    fn send<'a>(&'a self, recipient: &'a str, message: &'a Message) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let payload = serde_json::json!({
                "recipient": recipient,
                "subject": message.subject,
                "body": message.body,
                "attachment": message.attachment,
            })
            .to_string();

            let agent = self.agent.clone();
            let url = self.url.clone();
            tokio::task::spawn_blocking(move || {
                agent
                    .post(&url)
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
                    .map(|_| ())
                    .map_err(classify_http_error)
            })
            .await
            .map_err(|e| GatewayError::Transient(format!("webhook task failed: {}", e)))??;

            debug!(recipient, url = %self.url, "Webhook notification delivered");
            Ok(())
        })
    }
}
