//! Subscription entity and status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ProductId, SubscriptionId, UserId};

/// Subscription status as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
}

impl SubscriptionStatus {
    /// Parse a provider status string. Unknown strings are rejected upstream.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            "unpaid" => Some(Self::Unpaid),
            "incomplete" => Some(Self::Incomplete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
            Self::Incomplete => "incomplete",
        }
    }

    /// True when this status grants access to the product.
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Trialing | Self::Active | Self::PastDue)
    }

    /// True when this status must revoke the entitlement.
    pub fn revokes_access(&self) -> bool {
        matches!(self, Self::Canceled | Self::Unpaid)
    }
}

/// A recurring access grant, keyed naturally by the provider subscription id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub provider: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// True when an incoming event describes an older billing period than the
    /// one already applied. Delivery order is meaningless; only the event's
    /// own period fields decide which state is newer.
    pub fn is_stale_update(&self, incoming_period_start: Option<DateTime<Utc>>) -> bool {
        match (self.current_period_start, incoming_period_start) {
            (Some(stored), Some(incoming)) => incoming < stored,
            _ => false,
        }
    }

    /// True when the subscription has settled in a terminal state and must
    /// not be resurrected by redelivered activation events.
    pub fn is_terminal(&self) -> bool {
        self.status.revokes_access()
    }
}

/// Fields required to create or upsert a subscription from an event payload.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub provider: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// Status and period changes carried by a subscription update event.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subscription_with_period(start: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            id: SubscriptionId::new(),
            user_id: UserId::new(7),
            product_id: ProductId::new(3),
            provider: "stripe".to_string(),
            provider_subscription_id: "sub_1".to_string(),
            provider_customer_id: Some("cus_1".to_string()),
            status: SubscriptionStatus::Active,
            current_period_start: start,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            trial_start: None,
            trial_end: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn granting_statuses() {
        assert!(SubscriptionStatus::Trialing.grants_access());
        assert!(SubscriptionStatus::Active.grants_access());
        assert!(SubscriptionStatus::PastDue.grants_access());
        assert!(!SubscriptionStatus::Canceled.grants_access());
        assert!(!SubscriptionStatus::Unpaid.grants_access());
        assert!(!SubscriptionStatus::Incomplete.grants_access());
    }

    #[test]
    fn revoking_statuses() {
        assert!(SubscriptionStatus::Canceled.revokes_access());
        assert!(SubscriptionStatus::Unpaid.revokes_access());
        assert!(!SubscriptionStatus::PastDue.revokes_access());
        // Incomplete never granted, so there is nothing to revoke.
        assert!(!SubscriptionStatus::Incomplete.revokes_access());
    }

    #[test]
    fn status_wire_round_trip() {
        for s in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
        ] {
            assert_eq!(SubscriptionStatus::from_wire(s.as_str()), Some(s));
        }
        assert_eq!(SubscriptionStatus::from_wire("paused"), None);
    }

    #[test]
    fn older_period_start_is_stale() {
        let stored = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let incoming = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let sub = subscription_with_period(Some(stored));

        assert!(sub.is_stale_update(Some(incoming)));
        assert!(!sub.is_stale_update(Some(stored)));
    }

    #[test]
    fn missing_period_is_never_stale() {
        let sub = subscription_with_period(None);
        assert!(!sub.is_stale_update(Some(Utc::now())));
        assert!(!subscription_with_period(Some(Utc::now())).is_stale_update(None));
    }
}
