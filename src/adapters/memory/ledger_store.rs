//! In-memory billing ledger.
//!
//! Applies the same agreement rules as the Postgres adapter: subscription and
//! entitlement change together under one lock, stale and terminal updates are
//! rejected, payments are append-only.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::{
    Entitlement, EntitlementStatus, GrantSource, NewPayment, NewSubscription, Payment,
    PaymentStatus, Subscription, SubscriptionStatus, SubscriptionUpdate,
};
use crate::domain::foundation::{
    DomainError, EntitlementId, PaymentId, ProductId, SubscriptionId, UserId,
};
use crate::ports::{LedgerStore, MutationOutcome, UpdateOutcome};

#[derive(Default)]
struct LedgerState {
    subscriptions: Vec<Subscription>,
    entitlements: Vec<Entitlement>,
    payments: Vec<Payment>,
    fail_next: Option<String>,
}

/// In-memory `LedgerStore`.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next ledger operation fail with a transient database error.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.state.lock().expect("lock poisoned").fail_next = Some(message.into());
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().expect("lock poisoned").subscriptions.clone()
    }

    pub fn subscription(&self, provider_subscription_id: &str) -> Option<Subscription> {
        self.state
            .lock()
            .expect("lock poisoned")
            .subscriptions
            .iter()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned()
    }

    pub fn entitlement(&self, user_id: UserId, product_id: ProductId) -> Option<Entitlement> {
        self.state
            .lock()
            .expect("lock poisoned")
            .entitlements
            .iter()
            .find(|e| e.user_id == user_id && e.product_id == product_id)
            .cloned()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.state.lock().expect("lock poisoned").payments.clone()
    }
}

fn check_fail(state: &mut LedgerState) -> Result<(), DomainError> {
    if let Some(message) = state.fail_next.take() {
        return Err(DomainError::database(message));
    }
    Ok(())
}

fn activate_entitlement(
    state: &mut LedgerState,
    user_id: UserId,
    product_id: ProductId,
    subscription_id: Option<SubscriptionId>,
    granted_by: GrantSource,
) {
    let now = Utc::now();
    if let Some(existing) = state
        .entitlements
        .iter_mut()
        .find(|e| e.user_id == user_id && e.product_id == product_id)
    {
        existing.status = EntitlementStatus::Active;
        existing.subscription_id = subscription_id;
        existing.granted_by = granted_by;
        existing.updated_at = now;
    } else {
        state.entitlements.push(Entitlement {
            id: EntitlementId::new(),
            user_id,
            product_id,
            subscription_id,
            granted_by,
            status: EntitlementStatus::Active,
            created_at: now,
            updated_at: now,
        });
    }
}

/// Revokes the entitlement; returns true when it was active.
fn revoke_entitlement(state: &mut LedgerState, user_id: UserId, product_id: ProductId) -> bool {
    if let Some(existing) = state
        .entitlements
        .iter_mut()
        .find(|e| e.user_id == user_id && e.product_id == product_id)
    {
        let was_active = existing.status == EntitlementStatus::Active;
        existing.status = EntitlementStatus::Revoked;
        existing.updated_at = Utc::now();
        was_active
    } else {
        false
    }
}

fn append_payment(state: &mut LedgerState, payment: NewPayment) -> Payment {
    let row = Payment {
        id: PaymentId::new(),
        user_id: payment.user_id,
        amount: payment.amount,
        currency: payment.currency,
        provider: payment.provider,
        provider_payment_id: payment.provider_payment_id,
        status: payment.status,
        product_kind: payment.product_kind,
        product_id: payment.product_id,
        subscription_id: payment.subscription_id,
        metadata: payment.metadata,
        created_at: Utc::now(),
    };
    state.payments.push(row.clone());
    row
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn upsert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<Subscription, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;
        let now = Utc::now();

        let row = if let Some(existing) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.provider_subscription_id == subscription.provider_subscription_id)
        {
            existing.status = subscription.status;
            existing.current_period_start = subscription.current_period_start;
            existing.current_period_end = subscription.current_period_end;
            existing.cancel_at_period_end = subscription.cancel_at_period_end;
            existing.trial_start = subscription.trial_start;
            existing.trial_end = subscription.trial_end;
            existing.provider_customer_id = subscription.provider_customer_id.clone();
            existing.updated_at = now;
            existing.clone()
        } else {
            let row = Subscription {
                id: SubscriptionId::new(),
                user_id: subscription.user_id,
                product_id: subscription.product_id,
                provider: subscription.provider,
                provider_subscription_id: subscription.provider_subscription_id,
                provider_customer_id: subscription.provider_customer_id,
                status: subscription.status,
                current_period_start: subscription.current_period_start,
                current_period_end: subscription.current_period_end,
                cancel_at_period_end: subscription.cancel_at_period_end,
                canceled_at: None,
                trial_start: subscription.trial_start,
                trial_end: subscription.trial_end,
                metadata: subscription.metadata,
                created_at: now,
                updated_at: now,
            };
            state.subscriptions.push(row.clone());
            row
        };

        if row.status.grants_access() {
            activate_entitlement(
                &mut state,
                row.user_id,
                row.product_id,
                Some(row.id),
                GrantSource::Subscription,
            );
        } else if row.status.revokes_access() {
            revoke_entitlement(&mut state, row.user_id, row.product_id);
        }

        Ok(row)
    }

    async fn apply_subscription_update(
        &self,
        update: SubscriptionUpdate,
    ) -> Result<UpdateOutcome, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;

        let Some(index) = state
            .subscriptions
            .iter()
            .position(|s| s.provider_subscription_id == update.provider_subscription_id)
        else {
            return Ok(UpdateOutcome::NotFound);
        };

        let stored = state.subscriptions[index].clone();
        if stored.is_stale_update(update.current_period_start) {
            return Ok(UpdateOutcome::Stale);
        }
        // Terminal states are never resurrected by redelivered activations.
        if stored.is_terminal() && update.status.grants_access() {
            return Ok(UpdateOutcome::Stale);
        }

        let sub = &mut state.subscriptions[index];
        sub.status = update.status;
        if let Some(start) = update.current_period_start {
            sub.current_period_start = Some(start);
        }
        if let Some(end) = update.current_period_end {
            sub.current_period_end = Some(end);
        }
        sub.cancel_at_period_end = update.cancel_at_period_end;
        if let Some(canceled_at) = update.canceled_at {
            sub.canceled_at = Some(canceled_at);
        }
        sub.updated_at = Utc::now();
        let row = sub.clone();

        let entitlement_revoked = if row.status.revokes_access() {
            revoke_entitlement(&mut state, row.user_id, row.product_id)
        } else {
            if row.status.grants_access() {
                activate_entitlement(
                    &mut state,
                    row.user_id,
                    row.product_id,
                    Some(row.id),
                    GrantSource::Subscription,
                );
            }
            false
        };

        Ok(UpdateOutcome::Applied {
            subscription: row,
            entitlement_revoked,
        })
    }

    async fn mark_subscription_deleted(
        &self,
        provider_subscription_id: &str,
        canceled_at: DateTime<Utc>,
    ) -> Result<MutationOutcome, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;

        let Some(index) = state
            .subscriptions
            .iter()
            .position(|s| s.provider_subscription_id == provider_subscription_id)
        else {
            return Ok(MutationOutcome::NotFound);
        };

        let sub = &mut state.subscriptions[index];
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(canceled_at);
        sub.updated_at = Utc::now();
        let (user_id, product_id) = (sub.user_id, sub.product_id);

        revoke_entitlement(&mut state, user_id, product_id);
        Ok(MutationOutcome::Applied)
    }

    async fn grant_one_time_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
        payment: NewPayment,
    ) -> Result<Payment, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;

        activate_entitlement(&mut state, user_id, product_id, None, GrantSource::OneTime);
        Ok(append_payment(&mut state, payment))
    }

    async fn record_payment(&self, payment: NewPayment) -> Result<Payment, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;
        Ok(append_payment(&mut state, payment))
    }

    async fn mark_payment_refunded(
        &self,
        provider_payment_id: &str,
    ) -> Result<MutationOutcome, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;

        if let Some(payment) = state
            .payments
            .iter_mut()
            .find(|p| p.provider_payment_id.as_deref() == Some(provider_payment_id))
        {
            payment.status = PaymentStatus::Refunded;
            Ok(MutationOutcome::Applied)
        } else {
            Ok(MutationOutcome::NotFound)
        }
    }

    async fn find_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;
        Ok(state
            .subscriptions
            .iter()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn find_entitlement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Entitlement>, DomainError> {
        let mut state = self.state.lock().expect("lock poisoned");
        check_fail(&mut state)?;
        Ok(state
            .entitlements
            .iter()
            .find(|e| e.user_id == user_id && e.product_id == product_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_subscription(provider_id: &str, status: SubscriptionStatus) -> NewSubscription {
        NewSubscription {
            user_id: UserId::new(7),
            product_id: ProductId::new(3),
            provider: "stripe".to_string(),
            provider_subscription_id: provider_id.to_string(),
            provider_customer_id: Some("cus_1".to_string()),
            status,
            current_period_start: Some(Utc::now()),
            current_period_end: None,
            cancel_at_period_end: false,
            trial_start: None,
            trial_end: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_on_provider_id() {
        let store = InMemoryLedgerStore::new();

        store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::Active))
            .await
            .unwrap();
        store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::PastDue))
            .await
            .unwrap();

        assert_eq!(store.subscriptions().len(), 1);
        assert_eq!(
            store.subscription("sub_1").unwrap().status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn upsert_keeps_entitlement_in_agreement() {
        let store = InMemoryLedgerStore::new();

        store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::Active))
            .await
            .unwrap();
        assert!(store
            .entitlement(UserId::new(7), ProductId::new(3))
            .unwrap()
            .is_active());

        store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::Canceled))
            .await
            .unwrap();
        assert!(!store
            .entitlement(UserId::new(7), ProductId::new(3))
            .unwrap()
            .is_active());
    }

    #[tokio::test]
    async fn terminal_subscription_rejects_activation() {
        let store = InMemoryLedgerStore::new();
        store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::Canceled))
            .await
            .unwrap();

        let outcome = store
            .apply_subscription_update(SubscriptionUpdate {
                provider_subscription_id: "sub_1".to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: None,
                current_period_end: None,
                cancel_at_period_end: false,
                canceled_at: None,
            })
            .await
            .unwrap();

        assert!(matches!(outcome, UpdateOutcome::Stale));
    }

    #[tokio::test]
    async fn refund_only_touches_status() {
        let store = InMemoryLedgerStore::new();
        store
            .record_payment(NewPayment {
                user_id: UserId::new(7),
                amount: 4999,
                currency: "USD".to_string(),
                provider: "stripe".to_string(),
                provider_payment_id: Some("pi_1".to_string()),
                status: PaymentStatus::Completed,
                product_kind: crate::domain::billing::ProductKind::DigitalProduct,
                product_id: ProductId::new(3),
                subscription_id: None,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        let outcome = store.mark_payment_refunded("pi_1").await.unwrap();
        assert_eq!(outcome, MutationOutcome::Applied);

        let payments = store.payments();
        assert_eq!(payments[0].status, PaymentStatus::Refunded);
        assert_eq!(payments[0].amount, 4999);
    }

    #[tokio::test]
    async fn fail_next_fails_exactly_once() {
        let store = InMemoryLedgerStore::new();
        store.fail_next("connection refused");

        let err = store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::Active))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        assert!(store
            .upsert_subscription(new_subscription("sub_1", SubscriptionStatus::Active))
            .await
            .is_ok());
    }
}
