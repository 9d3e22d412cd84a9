//! Entitlement entity - the authoritative "may access product X" flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{EntitlementId, ProductId, SubscriptionId, UserId};

/// Whether an entitlement currently grants access.
///
/// Entitlements are revoked, never deleted, so the grant history survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
    Revoked,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

/// How the entitlement was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Subscription,
    OneTime,
    Manual,
}

impl GrantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::OneTime => "one_time",
            Self::Manual => "manual",
        }
    }
}

/// An access grant for one (user, product) pair. At most one row exists per
/// pair; activation is an upsert, never a second insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Absent for one-time purchases and manual grants.
    pub subscription_id: Option<SubscriptionId>,
    pub granted_by: GrantSource,
    pub status: EntitlementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    pub fn is_active(&self) -> bool {
        self.status == EntitlementStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(EntitlementStatus::Active.as_str(), "active");
        assert_eq!(EntitlementStatus::Revoked.as_str(), "revoked");
    }

    #[test]
    fn grant_source_strings() {
        assert_eq!(GrantSource::Subscription.as_str(), "subscription");
        assert_eq!(GrantSource::OneTime.as_str(), "one_time");
        assert_eq!(GrantSource::Manual.as_str(), "manual");
    }
}
