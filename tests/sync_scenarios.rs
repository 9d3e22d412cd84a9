//! End-to-end webhook processing scenarios.
//!
//! These tests drive the full pipeline the HTTP layer sees: a raw signed
//! payload goes in, and the subscription/entitlement/payment ledgers plus the
//! processed-event registry come out. Deliveries are signed with the real
//! HMAC scheme so signature verification is exercised, not mocked.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use entitlement_sync::adapters::memory::{
    InMemoryAuditLog, InMemoryLedgerStore, InMemoryNotifier, InMemoryWebhookEventStore,
};
use entitlement_sync::application::handlers::billing::{
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
};
use entitlement_sync::domain::billing::{
    EntitlementStatus, PaymentStatus, SubscriptionStatus, WebhookError, WebhookVerifier,
};
use entitlement_sync::domain::foundation::{ProductId, UserId};

const SECRET: &str = "whsec_scenario_secret";

// ════════════════════════════════════════════════════════════════════════════════
// Test Infrastructure
// ════════════════════════════════════════════════════════════════════════════════

struct Fixture {
    handler: ProcessWebhookHandler,
    ledger: Arc<InMemoryLedgerStore>,
    events: Arc<InMemoryWebhookEventStore>,
    audit: Arc<InMemoryAuditLog>,
    notifier: Arc<InMemoryNotifier>,
}

impl Fixture {
    fn new() -> Self {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let events = Arc::new(InMemoryWebhookEventStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let handler = ProcessWebhookHandler::new(
            WebhookVerifier::new(SECRET),
            events.clone(),
            ledger.clone(),
            audit.clone(),
            notifier.clone(),
        );
        Self {
            handler,
            ledger,
            events,
            audit,
            notifier,
        }
    }

    async fn deliver(
        &self,
        event_id: &str,
        event_type: &str,
        object: Value,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        self.handler.handle(signed(event_id, event_type, object)).await
    }
}

fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn signed(event_id: &str, event_type: &str, object: Value) -> ProcessWebhookCommand {
    let payload = json!({
        "id": event_id,
        "type": event_type,
        "created": Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": object }
    })
    .to_string();
    let timestamp = Utc::now().timestamp();
    let signature = format!("t={},v1={}", timestamp, sign(SECRET, timestamp, &payload));
    ProcessWebhookCommand {
        payload: payload.into_bytes(),
        signature,
    }
}

fn subscription_object(id: &str, status: &str, period_start: i64) -> Value {
    json!({
        "id": id,
        "customer": "cus_42",
        "status": status,
        "current_period_start": period_start,
        "current_period_end": period_start + 2_592_000,
        "metadata": { "userId": "7", "productId": "3" }
    })
}

fn user() -> UserId {
    UserId::new(7)
}

fn product() -> ProductId {
    ProductId::new(3)
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription Lifecycle
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_lifecycle_grants_then_revokes_access() {
    let fx = Fixture::new();

    fx.deliver(
        "evt_1",
        "customer.subscription.created",
        subscription_object("sub_1", "active", 1_700_000_000),
    )
    .await
    .unwrap();

    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Active);

    fx.deliver(
        "evt_2",
        "customer.subscription.deleted",
        json!({ "id": "sub_1", "status": "canceled", "canceled_at": 1_700_100_000 }),
    )
    .await
    .unwrap();

    let subscription = fx.ledger.subscription("sub_1").unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Canceled);
    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Revoked);
}

#[tokio::test]
async fn update_arriving_before_created_still_grants_access() {
    let fx = Fixture::new();

    // The updated event lands first; its metadata is enough to build the row.
    let result = fx
        .deliver(
            "evt_1",
            "customer.subscription.updated",
            subscription_object("sub_1", "active", 1_700_000_000),
        )
        .await
        .unwrap();

    assert!(matches!(result, ProcessWebhookResult::Processed { .. }));
    assert_eq!(fx.ledger.subscriptions().len(), 1);
    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Active);
}

#[tokio::test]
async fn stale_update_does_not_roll_back_state() {
    let fx = Fixture::new();

    fx.deliver(
        "evt_1",
        "customer.subscription.created",
        subscription_object("sub_1", "active", 1_700_000_000),
    )
    .await
    .unwrap();

    // An older update (earlier period start) arrives late.
    let result = fx
        .deliver(
            "evt_2",
            "customer.subscription.updated",
            subscription_object("sub_1", "past_due", 1_690_000_000),
        )
        .await
        .unwrap();

    assert!(matches!(result, ProcessWebhookResult::Ignored { .. }));
    let subscription = fx.ledger.subscription("sub_1").unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Active);
}

#[tokio::test]
async fn canceled_subscription_is_not_resurrected_by_late_update() {
    let fx = Fixture::new();

    fx.deliver(
        "evt_1",
        "customer.subscription.created",
        subscription_object("sub_1", "active", 1_700_000_000),
    )
    .await
    .unwrap();
    fx.deliver(
        "evt_2",
        "customer.subscription.deleted",
        json!({ "id": "sub_1", "status": "canceled", "canceled_at": 1_700_100_000 }),
    )
    .await
    .unwrap();

    // A late "active" update with a newer period must not restore access.
    let result = fx
        .deliver(
            "evt_3",
            "customer.subscription.updated",
            subscription_object("sub_1", "active", 1_700_200_000),
        )
        .await
        .unwrap();

    assert!(matches!(result, ProcessWebhookResult::Ignored { .. }));
    let subscription = fx.ledger.subscription("sub_1").unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Canceled);
    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Revoked);
}

// ════════════════════════════════════════════════════════════════════════════════
// Idempotency
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn redelivered_event_has_no_further_effect() {
    let fx = Fixture::new();
    let object = subscription_object("sub_1", "active", 1_700_000_000);

    let first = fx
        .deliver("evt_1", "customer.subscription.created", object.clone())
        .await
        .unwrap();
    let second = fx
        .deliver("evt_1", "customer.subscription.created", object)
        .await
        .unwrap();

    assert!(matches!(first, ProcessWebhookResult::Processed { .. }));
    assert_eq!(second, ProcessWebhookResult::AlreadyProcessed);
    assert_eq!(fx.ledger.subscriptions().len(), 1);
    assert_eq!(fx.audit.entries().len(), 1);
}

#[tokio::test]
async fn failed_event_is_retried_on_redelivery() {
    let fx = Fixture::new();
    fx.ledger.fail_next("connection reset");
    let object = subscription_object("sub_1", "active", 1_700_000_000);

    let first = fx
        .deliver("evt_1", "customer.subscription.created", object.clone())
        .await;
    assert!(first.is_err());
    assert_eq!(fx.events.records()["evt_1"].result, "failed");

    let second = fx
        .deliver("evt_1", "customer.subscription.created", object)
        .await
        .unwrap();
    assert!(matches!(second, ProcessWebhookResult::Processed { .. }));
    assert_eq!(fx.events.records()["evt_1"].result, "success");
    assert_eq!(fx.ledger.subscriptions().len(), 1);
}

// ════════════════════════════════════════════════════════════════════════════════
// Invoices and Payments
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn payment_failure_enters_grace_then_recovers_on_success() {
    let fx = Fixture::new();

    fx.deliver(
        "evt_1",
        "customer.subscription.created",
        subscription_object("sub_1", "active", 1_700_000_000),
    )
    .await
    .unwrap();

    fx.deliver(
        "evt_2",
        "invoice.payment_failed",
        json!({
            "id": "in_1",
            "subscription": "sub_1",
            "amount_due": 1999,
            "currency": "usd"
        }),
    )
    .await
    .unwrap();

    // Grace period: past_due keeps the entitlement while dunning runs.
    let subscription = fx.ledger.subscription("sub_1").unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::PastDue);
    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Active);
    assert_eq!(fx.ledger.payments()[0].status, PaymentStatus::Failed);
    assert!(!fx.notifier.notifications().is_empty());

    fx.deliver(
        "evt_3",
        "invoice.payment_succeeded",
        json!({
            "id": "in_2",
            "subscription": "sub_1",
            "payment_intent": "pi_2",
            "amount_paid": 1999,
            "currency": "usd"
        }),
    )
    .await
    .unwrap();

    let subscription = fx.ledger.subscription("sub_1").unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    let payments = fx.ledger.payments();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[1].status, PaymentStatus::Completed);
}

#[tokio::test]
async fn one_time_purchase_grants_and_refund_flips_only_status() {
    let fx = Fixture::new();

    fx.deliver(
        "evt_1",
        "checkout.session.completed",
        json!({
            "id": "cs_1",
            "payment_intent": "pi_1",
            "amount_total": 4999,
            "currency": "usd",
            "metadata": { "userId": "7", "productId": "3" }
        }),
    )
    .await
    .unwrap();

    let entitlement = fx.ledger.entitlement(user(), product()).unwrap();
    assert_eq!(entitlement.status, EntitlementStatus::Active);
    assert_eq!(fx.ledger.payments().len(), 1);
    assert_eq!(fx.ledger.payments()[0].status, PaymentStatus::Completed);

    let result = fx
        .deliver(
            "evt_2",
            "charge.refunded",
            json!({ "id": "ch_1", "payment_intent": "pi_1" }),
        )
        .await
        .unwrap();

    assert!(matches!(result, ProcessWebhookResult::Processed { .. }));
    // The record stays; only its status changes.
    let payments = fx.ledger.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Refunded);
    assert_eq!(payments[0].amount, 4999);
}

#[tokio::test]
async fn subscription_mode_checkout_defers_to_lifecycle_events() {
    let fx = Fixture::new();

    let result = fx
        .deliver(
            "evt_1",
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "subscription": "sub_1",
                "metadata": { "userId": "7", "productId": "3" }
            }),
        )
        .await
        .unwrap();

    assert!(matches!(result, ProcessWebhookResult::Processed { .. }));
    // No grant yet; customer.subscription.created is authoritative.
    assert!(fx.ledger.entitlement(user(), product()).is_none());
    assert!(fx.ledger.payments().is_empty());
}

// ════════════════════════════════════════════════════════════════════════════════
// Signature Verification
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn tampered_payload_is_rejected_before_any_side_effect() {
    let fx = Fixture::new();
    let mut cmd = signed(
        "evt_1",
        "customer.subscription.created",
        subscription_object("sub_1", "active", 1_700_000_000),
    );
    // Flip one byte after signing.
    let last = cmd.payload.len() - 2;
    cmd.payload[last] = cmd.payload[last].wrapping_add(1);

    let err = fx.handler.handle(cmd).await.unwrap_err();

    assert!(matches!(err, WebhookError::InvalidSignature));
    assert!(fx.events.records().is_empty());
    assert!(fx.ledger.subscriptions().is_empty());
}

#[tokio::test]
async fn replayed_old_timestamp_is_rejected() {
    let fx = Fixture::new();
    let payload = json!({
        "id": "evt_1",
        "type": "customer.subscription.created",
        "created": Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": subscription_object("sub_1", "active", 1_700_000_000) }
    })
    .to_string();
    let old = Utc::now().timestamp() - 3600;
    let cmd = ProcessWebhookCommand {
        signature: format!("t={},v1={}", old, sign(SECRET, old, &payload)),
        payload: payload.into_bytes(),
    };

    let err = fx.handler.handle(cmd).await.unwrap_err();

    assert!(matches!(err, WebhookError::TimestampOutOfRange));
    assert!(fx.events.records().is_empty());
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged_and_recorded() {
    let fx = Fixture::new();

    let result = fx
        .deliver("evt_1", "customer.created", json!({ "id": "cus_1" }))
        .await
        .unwrap();

    assert!(matches!(result, ProcessWebhookResult::Ignored { .. }));
    assert_eq!(fx.events.records()["evt_1"].result, "ignored");
}
