//! Audit log entries - one immutable row per state transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ProductId, UserId};

/// Audit severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Append-only record of a billing state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: Option<UserId>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<i64>,
    pub details: serde_json::Value,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates an info-severity entry for the given billing action.
    pub fn info(
        user_id: UserId,
        action: impl Into<String>,
        product_id: ProductId,
        details: serde_json::Value,
    ) -> Self {
        Self::with_severity(user_id, action, product_id, details, Severity::Info)
    }

    /// Creates a warning-severity entry.
    pub fn warning(
        user_id: UserId,
        action: impl Into<String>,
        product_id: ProductId,
        details: serde_json::Value,
    ) -> Self {
        Self::with_severity(user_id, action, product_id, details, Severity::Warning)
    }

    /// Creates a critical-severity entry.
    pub fn critical(
        user_id: UserId,
        action: impl Into<String>,
        product_id: ProductId,
        details: serde_json::Value,
    ) -> Self {
        Self::with_severity(user_id, action, product_id, details, Severity::Critical)
    }

    /// Creates an entry with no associated user, for events whose payload
    /// could not be tied back to an account.
    pub fn system(action: impl Into<String>, details: serde_json::Value, severity: Severity) -> Self {
        Self {
            user_id: None,
            action: action.into(),
            resource: "billing".to_string(),
            resource_id: None,
            details,
            severity,
            timestamp: Utc::now(),
        }
    }

    fn with_severity(
        user_id: UserId,
        action: impl Into<String>,
        product_id: ProductId,
        details: serde_json::Value,
        severity: Severity,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            action: action.into(),
            resource: "billing".to_string(),
            resource_id: Some(product_id.as_i64()),
            details,
            severity,
            timestamp: Utc::now(),
        }
    }
}
