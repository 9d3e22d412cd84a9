//! ProcessWebhookHandler - drives ledger state from provider webhook events.
//!
//! Pipeline: verify signature, admit through the dedup registry, decode into
//! a typed event, dispatch to the matching transition, record the outcome.
//! Admission happens before any side effect, so a duplicate delivery is
//! acknowledged without re-running its transition.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::billing::{
    AuditEntry, BillingEvent, ChargeRefunded, CheckoutCompleted, InvoiceEvent, NewPayment,
    NewSubscription, PaymentStatus, ProductKind, ProviderEvent, Severity, SubscriptionEvent,
    SubscriptionStatus, SubscriptionUpdate, WebhookError, WebhookVerifier,
};
use crate::ports::{
    Admission, AuditLog, LedgerStore, MutationOutcome, OperatorNotification, OperatorNotifier,
    ProcessingOutcome, UpdateOutcome, WebhookEventStore,
};

const PROVIDER: &str = "stripe";

/// Ceiling on redelivery retries for a failing event. Past this the event is
/// parked as ignored with a critical audit entry, so a poison payload cannot
/// burn database round-trips on every redelivery forever.
const MAX_PROCESSING_ATTEMPTS: i32 = 5;

/// Command carrying one raw webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body, byte-exact as received.
    pub payload: Vec<u8>,
    /// Value of the provider's signature header.
    pub signature: String,
}

/// Result of processing a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessWebhookResult {
    /// The transition ran and committed.
    Processed { action: &'static str },
    /// A prior delivery of this event already completed.
    AlreadyProcessed,
    /// The event was acknowledged without acting on it.
    Ignored { reason: String },
}

/// Outcome of a single transition handler.
enum Transition {
    Done(&'static str),
    Skipped(String),
}

/// Handler that synchronizes subscriptions, entitlements, and payments from
/// provider webhook events.
pub struct ProcessWebhookHandler {
    verifier: WebhookVerifier,
    events: Arc<dyn WebhookEventStore>,
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn OperatorNotifier>,
}

impl ProcessWebhookHandler {
    pub fn new(
        verifier: WebhookVerifier,
        events: Arc<dyn WebhookEventStore>,
        ledger: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        Self {
            verifier,
            events,
            ledger,
            audit,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        // 1. Verify signature and parse the envelope
        let event = self.verifier.verify_and_parse(&cmd.payload, &cmd.signature)?;

        // 2. Admit through the dedup registry before any side effect
        let payload = serde_json::to_value(&event).map_err(|e| WebhookError::Parse(e.to_string()))?;
        match self
            .events
            .admit(&event.id, &event.event_type, &payload)
            .await?
        {
            Admission::Fresh => {}
            Admission::RetryingFailed { attempts } if attempts >= MAX_PROCESSING_ATTEMPTS => {
                warn!(event_id = %event.id, attempts, "retry budget exhausted, parking event");
                self.audit
                    .append(AuditEntry::system(
                        "webhook_retries_exhausted",
                        json!({
                            "event_id": event.id,
                            "event_type": event.event_type,
                            "attempts": attempts,
                        }),
                        Severity::Critical,
                    ))
                    .await?;
                return self
                    .finish_ignored(&event, format!("gave up after {} failed attempts", attempts))
                    .await;
            }
            Admission::RetryingFailed { attempts } => {
                info!(event_id = %event.id, attempts, "retrying previously failed event");
            }
            Admission::AlreadyProcessed => {
                info!(event_id = %event.id, "duplicate delivery, already processed");
                return Ok(ProcessWebhookResult::AlreadyProcessed);
            }
        }

        // 3. Decode into a typed event
        let billing_event = match BillingEvent::decode(&event) {
            Ok(decoded) => decoded,
            Err(WebhookError::Ignored(reason)) => {
                return self.finish_ignored(&event, reason).await;
            }
            Err(WebhookError::MissingMetadata(field)) => {
                // Sessions created outside the platform flow carry no
                // identifiers; absorbed with an audit trail.
                self.audit
                    .append(AuditEntry::system(
                        "webhook_missing_metadata",
                        json!({
                            "event_id": event.id,
                            "event_type": event.event_type,
                            "field": field,
                        }),
                        Severity::Warning,
                    ))
                    .await?;
                return self
                    .finish_ignored(&event, format!("missing metadata field: {}", field))
                    .await;
            }
            Err(err) => {
                self.events
                    .mark_outcome(&event.id, &ProcessingOutcome::Failed(err.to_string()))
                    .await?;
                return Err(err);
            }
        };

        // 4. Dispatch, exhaustively
        let result = match &billing_event {
            BillingEvent::CheckoutCompleted(c) => self.on_checkout_completed(c).await,
            BillingEvent::SubscriptionCreated(s) => self.on_subscription_created(s).await,
            BillingEvent::SubscriptionUpdated(s) => self.on_subscription_updated(s).await,
            BillingEvent::SubscriptionDeleted(s) => self.on_subscription_deleted(s).await,
            BillingEvent::InvoicePaymentSucceeded(i) => self.on_invoice_succeeded(i).await,
            BillingEvent::InvoicePaymentFailed(i) => self.on_invoice_failed(i).await,
            BillingEvent::ChargeRefunded(c) => self.on_charge_refunded(c).await,
        };

        // 5. Record the outcome
        match result {
            Ok(Transition::Done(action)) => {
                self.events
                    .mark_outcome(&event.id, &ProcessingOutcome::Succeeded)
                    .await?;
                info!(event_id = %event.id, event_type = %event.event_type, action, "webhook processed");
                Ok(ProcessWebhookResult::Processed { action })
            }
            Ok(Transition::Skipped(reason)) => self.finish_ignored(&event, reason).await,
            Err(err) => {
                self.events
                    .mark_outcome(&event.id, &ProcessingOutcome::Failed(err.to_string()))
                    .await?;
                if let WebhookError::InvariantViolation(detail) = &err {
                    self.notify_best_effort(OperatorNotification::new(
                        "Billing invariant violation",
                        format!("event {}: {}", event.id, detail),
                        Severity::Critical,
                    ))
                    .await;
                }
                Err(err)
            }
        }
    }

    async fn finish_ignored(
        &self,
        event: &ProviderEvent,
        reason: String,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        self.events
            .mark_outcome(&event.id, &ProcessingOutcome::Ignored(reason.clone()))
            .await?;
        info!(event_id = %event.id, event_type = %event.event_type, %reason, "webhook ignored");
        Ok(ProcessWebhookResult::Ignored { reason })
    }

    // ── Transition handlers ──────────────────────────────────────────────

    async fn on_checkout_completed(
        &self,
        checkout: &CheckoutCompleted,
    ) -> Result<Transition, WebhookError> {
        let meta = checkout.metadata;

        if checkout.is_subscription_mode() {
            // Authoritative subscription state arrives via the lifecycle
            // events; here only the trail is written.
            self.audit
                .append(AuditEntry::info(
                    meta.user_id,
                    "checkout_completed",
                    meta.product_id,
                    json!({
                        "session_id": checkout.session_id,
                        "mode": "subscription",
                        "subscription_id": checkout.subscription_id,
                    }),
                ))
                .await?;
            return Ok(Transition::Done("checkout_acknowledged"));
        }

        let payment = NewPayment {
            user_id: meta.user_id,
            amount: checkout.amount_total,
            currency: checkout.currency.clone(),
            provider: PROVIDER.to_string(),
            provider_payment_id: checkout.payment_intent.clone(),
            status: PaymentStatus::Completed,
            product_kind: ProductKind::DigitalProduct,
            product_id: meta.product_id,
            subscription_id: None,
            metadata: json!({ "session_id": checkout.session_id }),
        };
        self.ledger
            .grant_one_time_purchase(meta.user_id, meta.product_id, payment)
            .await?;

        self.audit
            .append(AuditEntry::info(
                meta.user_id,
                "purchase_completed",
                meta.product_id,
                json!({
                    "session_id": checkout.session_id,
                    "amount": checkout.amount_total,
                    "currency": checkout.currency,
                }),
            ))
            .await?;
        self.notify_best_effort(
            OperatorNotification::new(
                "New purchase",
                format!(
                    "user {} purchased product {} ({} {})",
                    meta.user_id, meta.product_id, checkout.amount_total, checkout.currency
                ),
                Severity::Info,
            )
            .for_user(meta.user_id),
        )
        .await;

        Ok(Transition::Done("purchase_granted"))
    }

    async fn on_subscription_created(
        &self,
        event: &SubscriptionEvent,
    ) -> Result<Transition, WebhookError> {
        let meta = match event.metadata {
            Some(meta) => meta,
            None => {
                self.audit
                    .append(AuditEntry::system(
                        "subscription_without_metadata",
                        json!({ "provider_subscription_id": event.provider_subscription_id }),
                        Severity::Warning,
                    ))
                    .await?;
                return Ok(Transition::Skipped(
                    "subscription created outside platform flow".to_string(),
                ));
            }
        };

        self.ledger
            .upsert_subscription(new_subscription(event, meta.user_id, meta.product_id))
            .await?;

        self.audit
            .append(AuditEntry::info(
                meta.user_id,
                "subscription_created",
                meta.product_id,
                json!({
                    "provider_subscription_id": event.provider_subscription_id,
                    "status": event.status.as_str(),
                }),
            ))
            .await?;
        self.notify_best_effort(
            OperatorNotification::new(
                "New subscription",
                format!(
                    "user {} subscribed to product {}",
                    meta.user_id, meta.product_id
                ),
                Severity::Info,
            )
            .for_user(meta.user_id),
        )
        .await;

        Ok(Transition::Done("subscription_created"))
    }

    async fn on_subscription_updated(
        &self,
        event: &SubscriptionEvent,
    ) -> Result<Transition, WebhookError> {
        let update = SubscriptionUpdate {
            provider_subscription_id: event.provider_subscription_id.clone(),
            status: event.status,
            current_period_start: event.current_period_start,
            current_period_end: event.current_period_end,
            cancel_at_period_end: event.cancel_at_period_end,
            canceled_at: event.canceled_at,
        };

        match self.ledger.apply_subscription_update(update).await? {
            UpdateOutcome::Applied {
                subscription,
                entitlement_revoked,
            } => {
                if entitlement_revoked {
                    self.audit
                        .append(AuditEntry::warning(
                            subscription.user_id,
                            "entitlement_revoked",
                            subscription.product_id,
                            json!({
                                "provider_subscription_id": event.provider_subscription_id,
                                "status": event.status.as_str(),
                            }),
                        ))
                        .await?;
                    self.notify_best_effort(
                        OperatorNotification::new(
                            "Subscription lapsed",
                            format!(
                                "user {} lost access to product {} ({})",
                                subscription.user_id,
                                subscription.product_id,
                                event.status.as_str()
                            ),
                            Severity::Warning,
                        )
                        .for_user(subscription.user_id),
                    )
                    .await;
                } else {
                    self.audit
                        .append(AuditEntry::info(
                            subscription.user_id,
                            "subscription_updated",
                            subscription.product_id,
                            json!({
                                "provider_subscription_id": event.provider_subscription_id,
                                "status": event.status.as_str(),
                            }),
                        ))
                        .await?;
                }
                Ok(Transition::Done("subscription_updated"))
            }
            UpdateOutcome::Stale => Ok(Transition::Skipped(
                "event older than stored subscription state".to_string(),
            )),
            UpdateOutcome::NotFound => {
                // Out-of-order delivery: the update arrived before the create.
                // With metadata the full row can be built from this payload.
                if let Some(meta) = event.metadata {
                    self.ledger
                        .upsert_subscription(new_subscription(event, meta.user_id, meta.product_id))
                        .await?;
                    self.audit
                        .append(AuditEntry::info(
                            meta.user_id,
                            "subscription_created",
                            meta.product_id,
                            json!({
                                "provider_subscription_id": event.provider_subscription_id,
                                "status": event.status.as_str(),
                                "from_update": true,
                            }),
                        ))
                        .await?;
                    Ok(Transition::Done("subscription_created"))
                } else {
                    self.audit
                        .append(AuditEntry::system(
                            "unknown_subscription",
                            json!({ "provider_subscription_id": event.provider_subscription_id }),
                            Severity::Warning,
                        ))
                        .await?;
                    Ok(Transition::Skipped(format!(
                        "no subscription {}",
                        event.provider_subscription_id
                    )))
                }
            }
        }
    }

    async fn on_subscription_deleted(
        &self,
        event: &SubscriptionEvent,
    ) -> Result<Transition, WebhookError> {
        let canceled_at = event.canceled_at.unwrap_or_else(Utc::now);

        match self
            .ledger
            .mark_subscription_deleted(&event.provider_subscription_id, canceled_at)
            .await?
        {
            MutationOutcome::Applied => {
                if let Some(sub) = self
                    .ledger
                    .find_subscription(&event.provider_subscription_id)
                    .await?
                {
                    self.audit
                        .append(AuditEntry::warning(
                            sub.user_id,
                            "subscription_canceled",
                            sub.product_id,
                            json!({ "provider_subscription_id": event.provider_subscription_id }),
                        ))
                        .await?;
                    self.notify_best_effort(
                        OperatorNotification::new(
                            "Subscription canceled",
                            format!(
                                "user {} canceled product {}",
                                sub.user_id, sub.product_id
                            ),
                            Severity::Warning,
                        )
                        .for_user(sub.user_id),
                    )
                    .await;
                }
                Ok(Transition::Done("subscription_canceled"))
            }
            MutationOutcome::NotFound => {
                self.audit
                    .append(AuditEntry::system(
                        "unknown_subscription",
                        json!({ "provider_subscription_id": event.provider_subscription_id }),
                        Severity::Warning,
                    ))
                    .await?;
                Ok(Transition::Skipped(format!(
                    "no subscription {}",
                    event.provider_subscription_id
                )))
            }
        }
    }

    async fn on_invoice_succeeded(&self, invoice: &InvoiceEvent) -> Result<Transition, WebhookError> {
        let provider_subscription_id = match &invoice.provider_subscription_id {
            Some(id) => id,
            None => {
                return Ok(Transition::Skipped(
                    "invoice not tied to a subscription".to_string(),
                ))
            }
        };

        let sub = match self.ledger.find_subscription(provider_subscription_id).await? {
            Some(sub) => sub,
            None => {
                self.audit
                    .append(AuditEntry::system(
                        "unknown_subscription",
                        json!({
                            "provider_subscription_id": provider_subscription_id,
                            "invoice_id": invoice.invoice_id,
                        }),
                        Severity::Warning,
                    ))
                    .await?;
                return Ok(Transition::Skipped(format!(
                    "no subscription {}",
                    provider_subscription_id
                )));
            }
        };

        self.ledger
            .record_payment(NewPayment {
                user_id: sub.user_id,
                amount: invoice.amount_paid,
                currency: invoice.currency.clone(),
                provider: PROVIDER.to_string(),
                provider_payment_id: invoice
                    .payment_intent
                    .clone()
                    .or_else(|| Some(invoice.invoice_id.clone())),
                status: PaymentStatus::Completed,
                product_kind: ProductKind::Subscription,
                product_id: sub.product_id,
                subscription_id: Some(sub.id),
                metadata: json!({ "invoice_id": invoice.invoice_id }),
            })
            .await?;

        // A successful charge recovers a past-due subscription. The stale
        // and terminal guards keep canceled subscriptions down.
        if !sub.status.grants_access() || sub.status == SubscriptionStatus::PastDue {
            self.ledger
                .apply_subscription_update(SubscriptionUpdate {
                    provider_subscription_id: provider_subscription_id.clone(),
                    status: SubscriptionStatus::Active,
                    current_period_start: None,
                    current_period_end: None,
                    cancel_at_period_end: sub.cancel_at_period_end,
                    canceled_at: None,
                })
                .await?;
        }

        self.audit
            .append(AuditEntry::info(
                sub.user_id,
                "invoice_payment_succeeded",
                sub.product_id,
                json!({
                    "invoice_id": invoice.invoice_id,
                    "amount": invoice.amount_paid,
                    "currency": invoice.currency,
                }),
            ))
            .await?;

        Ok(Transition::Done("invoice_recorded"))
    }

    async fn on_invoice_failed(&self, invoice: &InvoiceEvent) -> Result<Transition, WebhookError> {
        let provider_subscription_id = match &invoice.provider_subscription_id {
            Some(id) => id,
            None => {
                return Ok(Transition::Skipped(
                    "invoice not tied to a subscription".to_string(),
                ))
            }
        };

        let sub = match self.ledger.find_subscription(provider_subscription_id).await? {
            Some(sub) => sub,
            None => {
                self.audit
                    .append(AuditEntry::system(
                        "unknown_subscription",
                        json!({
                            "provider_subscription_id": provider_subscription_id,
                            "invoice_id": invoice.invoice_id,
                        }),
                        Severity::Warning,
                    ))
                    .await?;
                return Ok(Transition::Skipped(format!(
                    "no subscription {}",
                    provider_subscription_id
                )));
            }
        };

        self.ledger
            .record_payment(NewPayment {
                user_id: sub.user_id,
                amount: invoice.amount_due,
                currency: invoice.currency.clone(),
                provider: PROVIDER.to_string(),
                provider_payment_id: invoice
                    .payment_intent
                    .clone()
                    .or_else(|| Some(invoice.invoice_id.clone())),
                status: PaymentStatus::Failed,
                product_kind: ProductKind::Subscription,
                product_id: sub.product_id,
                subscription_id: Some(sub.id),
                metadata: json!({ "invoice_id": invoice.invoice_id }),
            })
            .await?;

        // Past due retains access during the provider's retry schedule; the
        // entitlement only falls when the subscription goes canceled/unpaid.
        if !sub.is_terminal() {
            self.ledger
                .apply_subscription_update(SubscriptionUpdate {
                    provider_subscription_id: provider_subscription_id.clone(),
                    status: SubscriptionStatus::PastDue,
                    current_period_start: None,
                    current_period_end: None,
                    cancel_at_period_end: sub.cancel_at_period_end,
                    canceled_at: None,
                })
                .await?;
        }

        self.audit
            .append(AuditEntry::critical(
                sub.user_id,
                "invoice_payment_failed",
                sub.product_id,
                json!({
                    "invoice_id": invoice.invoice_id,
                    "amount_due": invoice.amount_due,
                    "currency": invoice.currency,
                }),
            ))
            .await?;
        self.notify_best_effort(
            OperatorNotification::new(
                "Payment failed",
                format!(
                    "invoice {} failed for user {} (product {})",
                    invoice.invoice_id, sub.user_id, sub.product_id
                ),
                Severity::Critical,
            )
            .for_user(sub.user_id),
        )
        .await;

        Ok(Transition::Done("payment_failure_recorded"))
    }

    async fn on_charge_refunded(&self, charge: &ChargeRefunded) -> Result<Transition, WebhookError> {
        let provider_payment_id = charge
            .payment_intent
            .as_deref()
            .unwrap_or(&charge.charge_id);

        match self.ledger.mark_payment_refunded(provider_payment_id).await? {
            MutationOutcome::Applied => {
                self.audit
                    .append(AuditEntry::system(
                        "payment_refunded",
                        json!({ "provider_payment_id": provider_payment_id }),
                        Severity::Warning,
                    ))
                    .await?;
                Ok(Transition::Done("payment_refunded"))
            }
            MutationOutcome::NotFound => Ok(Transition::Skipped(format!(
                "no payment {}",
                provider_payment_id
            ))),
        }
    }

    async fn notify_best_effort(&self, notification: OperatorNotification) {
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(error = %err, "operator notification failed");
        }
    }
}

fn new_subscription(
    event: &SubscriptionEvent,
    user_id: crate::domain::foundation::UserId,
    product_id: crate::domain::foundation::ProductId,
) -> NewSubscription {
    NewSubscription {
        user_id,
        product_id,
        provider: PROVIDER.to_string(),
        provider_subscription_id: event.provider_subscription_id.clone(),
        provider_customer_id: event.customer_id.clone(),
        status: event.status,
        current_period_start: event.current_period_start,
        current_period_end: event.current_period_end,
        cancel_at_period_end: event.cancel_at_period_end,
        trial_start: event.trial_start,
        trial_end: event.trial_end,
        metadata: json!({}),
    }
}
