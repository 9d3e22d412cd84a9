//! WebhookEventStore port - dedup registry for provider webhook deliveries.
//!
//! The provider delivers at-least-once: timeouts, 5xx responses, and lost
//! acknowledgements all trigger redelivery. Every event is admitted through
//! this store before any side effect runs, so duplicate deliveries are
//! detected by a database constraint rather than by handler discipline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::DomainError;

/// How long an admitted-but-unmarked event is considered in flight.
///
/// A `pending` marker older than this window means the owning process died
/// between admission and outcome; redeliveries past the window are allowed
/// to retry instead of being acknowledged as duplicates.
pub const IN_FLIGHT_GRACE_SECS: i64 = 300;

/// Outcome of admitting an event for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First delivery of this event id; the caller owns processing it.
    Fresh,
    /// A prior delivery completed (successfully or as an explicit ignore), or
    /// is still in flight within the grace window; the caller must
    /// acknowledge without re-running side effects.
    AlreadyProcessed,
    /// A prior delivery was admitted but failed, or was abandoned mid-flight
    /// past the grace window; the caller may retry.
    RetryingFailed {
        /// Number of failed attempts so far.
        attempts: i32,
    },
}

/// Terminal result of processing an admitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Side effects ran to completion.
    Succeeded,
    /// Event was deliberately not acted on.
    Ignored(String),
    /// Processing failed; a later redelivery may retry.
    Failed(String),
}

impl ProcessingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Ignored(_) => "ignored",
            Self::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Ignored(reason) => Some(reason),
            Self::Failed(error) => Some(error),
        }
    }
}

/// Port for the webhook dedup registry.
///
/// Implementations must enforce uniqueness on the provider event id at the
/// storage layer (unique index with insert-or-nothing semantics) so that two
/// concurrent deliveries of the same event cannot both admit as `Fresh`.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Atomically claim an event id for processing.
    ///
    /// Inserts an unprocessed marker row before any side effect runs. Exactly
    /// one concurrent caller observes `Fresh` for a given event id. A marker
    /// still `pending` after [`IN_FLIGHT_GRACE_SECS`] is treated as abandoned
    /// and readmitted as `RetryingFailed`.
    async fn admit(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Admission, DomainError>;

    /// Record the terminal outcome for an admitted event.
    ///
    /// `Succeeded` and `Ignored` mark the event processed; `Failed` leaves it
    /// eligible for retry on redelivery and increments the attempt counter.
    async fn mark_outcome(
        &self,
        event_id: &str,
        outcome: &ProcessingOutcome,
    ) -> Result<(), DomainError>;

    /// Delete records processed before the cutoff. Returns rows deleted.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DomainError>;
}
