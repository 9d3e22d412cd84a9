//! In-memory audit log.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::billing::AuditEntry;
use crate::domain::foundation::DomainError;
use crate::ports::AuditLog;

/// In-memory `AuditLog`. Append-only, like its Postgres counterpart.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), DomainError> {
        self.entries.lock().expect("lock poisoned").push(entry);
        Ok(())
    }
}
