//! Webhook error taxonomy.
//!
//! Four classes drive the behavior: malformed events are rejected without a
//! ledger row, transient infrastructure failures surface as 5xx so the
//! provider redelivers, unknown references are absorbed per-policy, and
//! invariant violations abort the event without partial commit.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook verification and processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse the signature header or the payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Required metadata field missing from the event.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Required field missing from the event payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Event was acknowledged but intentionally not acted on.
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Applying the event would leave subscription and entitlement
    /// disagreeing. Never committed; recorded for manual review.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Database or storage temporarily unavailable.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// True when the provider should redeliver this event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_))
    }

    /// Maps the error to the HTTP status the receiver returns.
    ///
    /// The status controls the provider's retry behavior: 2xx acknowledges,
    /// 4xx permanently rejects, 5xx triggers redelivery.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Auth failures, permanent rejection
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::InvalidTimestamp
            | WebhookError::Parse(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            // Absorbed events are acknowledged so the provider stops retrying
            WebhookError::Ignored(_) => StatusCode::OK,

            // Recorded for review; redelivery would fail identically, so
            // acknowledge rather than loop
            WebhookError::InvariantViolation(_) => StatusCode::OK,

            // Redelivery drives eventual consistency
            WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        if err.is_transient() {
            WebhookError::Database(err.to_string())
        } else {
            WebhookError::InvariantViolation(err.to_string())
        }
    }
}
