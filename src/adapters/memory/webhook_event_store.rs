//! In-memory webhook dedup registry.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;
use crate::ports::{Admission, ProcessingOutcome, WebhookEventStore, IN_FLIGHT_GRACE_SECS};

/// Stored state for one admitted event.
#[derive(Debug, Clone)]
pub struct StoredWebhookEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    /// "pending", "success", "ignored", or "failed".
    pub result: String,
    pub error: Option<String>,
    pub attempts: i32,
    pub processed_at: DateTime<Utc>,
}

/// In-memory `WebhookEventStore`. A `Mutex` around the map gives the same
/// claim-exactly-once behavior the unique index provides in Postgres.
#[derive(Default)]
pub struct InMemoryWebhookEventStore {
    records: Mutex<HashMap<String, StoredWebhookEvent>>,
}

impl InMemoryWebhookEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, keyed by event id.
    pub fn records(&self) -> HashMap<String, StoredWebhookEvent> {
        self.records.lock().expect("lock poisoned").clone()
    }

    /// Shift a record's last-touched time into the past, letting tests cross
    /// the in-flight grace window without waiting.
    pub fn backdate(&self, event_id: &str, by: chrono::Duration) {
        if let Some(record) = self
            .records
            .lock()
            .expect("lock poisoned")
            .get_mut(event_id)
        {
            record.processed_at -= by;
        }
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryWebhookEventStore {
    async fn admit(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Admission, DomainError> {
        let mut records = self.records.lock().expect("lock poisoned");

        if let Some(existing) = records.get(event_id) {
            // A pending marker past the grace window means the process that
            // admitted it died before recording an outcome.
            let abandoned = existing.result == "pending"
                && Utc::now() - existing.processed_at
                    > chrono::Duration::seconds(IN_FLIGHT_GRACE_SECS);
            return Ok(if existing.result == "failed" || abandoned {
                Admission::RetryingFailed {
                    attempts: existing.attempts,
                }
            } else {
                Admission::AlreadyProcessed
            });
        }

        records.insert(
            event_id.to_string(),
            StoredWebhookEvent {
                event_type: event_type.to_string(),
                payload: payload.clone(),
                result: "pending".to_string(),
                error: None,
                attempts: 0,
                processed_at: Utc::now(),
            },
        );
        Ok(Admission::Fresh)
    }

    async fn mark_outcome(
        &self,
        event_id: &str,
        outcome: &ProcessingOutcome,
    ) -> Result<(), DomainError> {
        let mut records = self.records.lock().expect("lock poisoned");
        let record = records
            .get_mut(event_id)
            .ok_or_else(|| DomainError::database(format!("event {} was never admitted", event_id)))?;

        record.result = outcome.as_str().to_string();
        record.error = outcome.detail().map(str::to_string);
        record.processed_at = Utc::now();
        if matches!(outcome, ProcessingOutcome::Failed(_)) {
            record.attempts += 1;
        }
        Ok(())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.lock().expect("lock poisoned");
        let before = records.len();
        records.retain(|_, r| r.result == "pending" || r.processed_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_admit_is_fresh_then_already_processed() {
        let store = InMemoryWebhookEventStore::new();
        let payload = serde_json::json!({});

        assert_eq!(
            store.admit("evt_1", "type", &payload).await.unwrap(),
            Admission::Fresh
        );
        store
            .mark_outcome("evt_1", &ProcessingOutcome::Succeeded)
            .await
            .unwrap();
        assert_eq!(
            store.admit("evt_1", "type", &payload).await.unwrap(),
            Admission::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn failed_event_is_readmitted_for_retry() {
        let store = InMemoryWebhookEventStore::new();
        let payload = serde_json::json!({});

        store.admit("evt_1", "type", &payload).await.unwrap();
        store
            .mark_outcome("evt_1", &ProcessingOutcome::Failed("db down".to_string()))
            .await
            .unwrap();

        assert_eq!(
            store.admit("evt_1", "type", &payload).await.unwrap(),
            Admission::RetryingFailed { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn pending_event_within_grace_window_is_a_duplicate() {
        let store = InMemoryWebhookEventStore::new();
        let payload = serde_json::json!({});

        store.admit("evt_1", "type", &payload).await.unwrap();

        // No outcome recorded; a concurrent redelivery must not re-run side
        // effects while the first delivery is still in flight.
        assert_eq!(
            store.admit("evt_1", "type", &payload).await.unwrap(),
            Admission::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn pending_event_past_grace_window_is_readmitted() {
        let store = InMemoryWebhookEventStore::new();
        let payload = serde_json::json!({});

        store.admit("evt_1", "type", &payload).await.unwrap();
        store.backdate(
            "evt_1",
            chrono::Duration::seconds(IN_FLIGHT_GRACE_SECS + 1),
        );

        // The admitting process crashed before marking an outcome; the next
        // redelivery gets to retry instead of being swallowed forever.
        assert_eq!(
            store.admit("evt_1", "type", &payload).await.unwrap(),
            Admission::RetryingFailed { attempts: 0 }
        );
    }

    #[tokio::test]
    async fn delete_before_removes_only_old_processed_records() {
        let store = InMemoryWebhookEventStore::new();
        let payload = serde_json::json!({});

        store.admit("evt_old", "type", &payload).await.unwrap();
        store
            .mark_outcome("evt_old", &ProcessingOutcome::Succeeded)
            .await
            .unwrap();

        let deleted = store
            .delete_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
