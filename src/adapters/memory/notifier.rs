//! In-memory operator notifier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{OperatorNotification, OperatorNotifier};

/// In-memory `OperatorNotifier` that records what would have been sent.
#[derive(Default)]
pub struct InMemoryNotifier {
    notifications: Mutex<Vec<OperatorNotification>>,
    fail: AtomicBool,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent delivery fail, for exercising best-effort
    /// call sites.
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<OperatorNotification> {
        self.notifications.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl OperatorNotifier for InMemoryNotifier {
    async fn notify(&self, notification: OperatorNotification) -> Result<(), DomainError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DomainError::database("notification channel unavailable"));
        }
        self.notifications
            .lock()
            .expect("lock poisoned")
            .push(notification);
        Ok(())
    }
}
