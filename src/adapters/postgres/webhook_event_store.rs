//! PostgreSQL implementation of WebhookEventStore.
//!
//! Admission rides on the unique index over `event_id`: `ON CONFLICT DO
//! NOTHING` makes the insert race-free, so exactly one of two concurrent
//! deliveries claims the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::DomainError;
use crate::ports::{Admission, ProcessingOutcome, WebhookEventStore, IN_FLIGHT_GRACE_SECS};

/// PostgreSQL implementation of the WebhookEventStore port.
pub struct PostgresWebhookEventStore {
    pool: PgPool,
}

impl PostgresWebhookEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> DomainError {
    DomainError::database(format!("database error: {}", e))
}

#[async_trait]
impl WebhookEventStore for PostgresWebhookEventStore {
    async fn admit(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Admission, DomainError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, payload, result, attempts, created_at)
            VALUES ($1, $2, $3, 'pending', 0, now())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if inserted.rows_affected() > 0 {
            return Ok(Admission::Fresh);
        }

        // A row still 'pending' past the grace window was abandoned by a
        // process that died between admission and outcome; let the
        // redelivery retry it.
        let (result, attempts, abandoned): (String, i32, bool) = sqlx::query_as(
            r#"
            SELECT result,
                   attempts,
                   result = 'pending' AND created_at < now() - make_interval(secs => $2)
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(IN_FLIGHT_GRACE_SECS as f64)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if result == "failed" || abandoned {
            Admission::RetryingFailed { attempts }
        } else {
            Admission::AlreadyProcessed
        })
    }

    async fn mark_outcome(
        &self,
        event_id: &str,
        outcome: &ProcessingOutcome,
    ) -> Result<(), DomainError> {
        let failed = matches!(outcome, ProcessingOutcome::Failed(_));
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET result = $2,
                error = $3,
                attempts = attempts + CASE WHEN $4 THEN 1 ELSE 0 END,
                processed_at = now()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(outcome.as_str())
        .bind(outcome.detail())
        .bind(failed)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::database(format!(
                "event {} was never admitted",
                event_id
            )));
        }
        Ok(())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM webhook_events WHERE result <> 'pending' AND processed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
