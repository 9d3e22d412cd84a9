//! PostgreSQL implementation of AuditLog.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::AuditEntry;
use crate::domain::foundation::DomainError;
use crate::ports::AuditLog;

/// PostgreSQL implementation of the AuditLog port. Insert-only; the table
/// carries no update path.
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, resource, resource_id, details, severity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.user_id.map(|id| id.as_i64()))
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(entry.resource_id)
        .bind(&entry.details)
        .bind(entry.severity.as_str())
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("database error: {}", e)))?;

        Ok(())
    }
}
