//! AuditLog port - append-only record of billing transitions.

use async_trait::async_trait;

use crate::domain::billing::AuditEntry;
use crate::domain::foundation::DomainError;

/// Port for the append-only audit trail.
///
/// Entries are never updated or deleted; failures to append are surfaced so
/// the caller can decide whether the transition may proceed without a trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), DomainError>;
}
