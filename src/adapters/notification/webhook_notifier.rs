//! Operator notifier that posts to a chat/ops webhook URL.
//!
//! Delivery is best-effort by contract; callers log and continue on failure.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::foundation::DomainError;
use crate::ports::{OperatorNotification, OperatorNotifier};

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Incoming webhook URL for the operations channel. Absent disables
    /// delivery; notifications are dropped silently.
    pub webhook_url: Option<String>,
}

/// Delivery is awaited on the webhook acknowledgement path, so a hung ops
/// endpoint must not hold the provider's delivery open.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP implementation of the OperatorNotifier port.
pub struct WebhookNotifier {
    config: NotifierConfig,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            http_client,
        }
    }
}

#[async_trait]
impl OperatorNotifier for WebhookNotifier {
    async fn notify(&self, notification: OperatorNotification) -> Result<(), DomainError> {
        let Some(url) = self.config.webhook_url.as_deref() else {
            return Ok(());
        };

        let body = json!({
            "title": notification.title,
            "body": notification.body,
            "severity": notification.severity.as_str(),
            "user_id": notification.user_id.map(|id| id.as_i64()),
        });

        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::database(format!("notification delivery failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DomainError::database(format!(
                "notification endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
