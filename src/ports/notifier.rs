//! OperatorNotifier port - best-effort alerts for billing events that need
//! human attention.

use async_trait::async_trait;

use crate::domain::billing::Severity;
use crate::domain::foundation::{DomainError, UserId};

/// A notification destined for the operations channel.
#[derive(Debug, Clone)]
pub struct OperatorNotification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub user_id: Option<UserId>,
}

impl OperatorNotification {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
            user_id: None,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Port for operator notifications.
///
/// Delivery is best-effort: callers log failures and continue, and an
/// undeliverable notification never fails the transition that produced it.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, notification: OperatorNotification) -> Result<(), DomainError>;
}
