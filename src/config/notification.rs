//! Operator notification configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Notification configuration (operations webhook)
///
/// Delivery is best-effort and entirely optional; without a URL the service
/// drops notifications silently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Incoming webhook URL for the operations channel
    pub webhook_url: Option<String>,
}

impl NotificationConfig {
    /// Validate notification configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = self.webhook_url.as_deref() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidNotificationUrl);
            }
        }
        Ok(())
    }
}
