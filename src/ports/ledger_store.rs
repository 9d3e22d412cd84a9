//! LedgerStore port - transactional access to subscriptions, entitlements,
//! and payments.
//!
//! Each operation spans a whole business transition: the subscription write
//! and the entitlement write it implies commit together or not at all, so a
//! crash between them can never leave a subscription active with its
//! entitlement revoked (or the reverse).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::{
    Entitlement, NewPayment, NewSubscription, Payment, Subscription, SubscriptionUpdate,
};
use crate::domain::foundation::{DomainError, ProductId, UserId};

/// Outcome of applying a subscription update event.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The update was newer than the stored state and was applied.
    Applied {
        subscription: Subscription,
        /// True when the status change revoked the entitlement in the same
        /// transaction.
        entitlement_revoked: bool,
    },
    /// The event described an older billing period, or a terminal
    /// subscription; nothing was written.
    Stale,
    /// No subscription exists for the provider id.
    NotFound,
}

/// Outcome of a targeted single-row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    NotFound,
}

/// Port for the billing ledger.
///
/// Implementations serialize concurrent transitions for the same provider
/// subscription id (row lock or equivalent) so that two events for one
/// subscription are applied one after the other.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create or refresh a subscription and activate its entitlement in one
    /// transaction.
    ///
    /// Keyed on the provider subscription id: a redelivered create event
    /// updates the existing row instead of inserting a second one. The
    /// entitlement for (user, product) is upserted to active when the status
    /// grants access.
    async fn upsert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<Subscription, DomainError>;

    /// Apply a status/period update to an existing subscription.
    ///
    /// Loads the stored row under a write lock, rejects stale events (older
    /// `current_period_start`, or activation of a terminal subscription), and
    /// revokes or re-activates the entitlement in the same transaction when
    /// the status flips access.
    async fn apply_subscription_update(
        &self,
        update: SubscriptionUpdate,
    ) -> Result<UpdateOutcome, DomainError>;

    /// Mark a subscription canceled and revoke its entitlement together.
    async fn mark_subscription_deleted(
        &self,
        provider_subscription_id: &str,
        canceled_at: DateTime<Utc>,
    ) -> Result<MutationOutcome, DomainError>;

    /// Grant a one-time purchase: activate the entitlement and record the
    /// payment in one transaction.
    async fn grant_one_time_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
        payment: NewPayment,
    ) -> Result<Payment, DomainError>;

    /// Append a payment row. Payments are immutable once written.
    async fn record_payment(&self, payment: NewPayment) -> Result<Payment, DomainError>;

    /// Flip an existing payment to refunded, the only permitted payment
    /// mutation. Matched by the provider's payment id.
    async fn mark_payment_refunded(
        &self,
        provider_payment_id: &str,
    ) -> Result<MutationOutcome, DomainError>;

    /// Look up a subscription by the provider's id.
    async fn find_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Look up the entitlement for a (user, product) pair.
    async fn find_entitlement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Entitlement>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn LedgerStore) {}
    }
}
