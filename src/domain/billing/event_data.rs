//! Typed event payloads and the decoded event union.
//!
//! The raw envelope is decoded exactly once at the dispatcher boundary into
//! `BillingEvent`; transition handlers receive strongly typed fields and never
//! touch string-keyed metadata maps.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::domain::foundation::{ProductId, UserId};

use super::provider_event::{ProviderEvent, ProviderEventType};
use super::subscription::SubscriptionStatus;
use super::webhook_errors::WebhookError;

/// Identifiers the platform embeds in provider session/subscription metadata
/// so that webhook events are self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMetadata {
    pub user_id: UserId,
    pub product_id: ProductId,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireMetadata {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(rename = "productId")]
    product_id: Option<String>,
}

impl WireMetadata {
    fn parse(&self) -> Result<EventMetadata, WebhookError> {
        let user_id = self
            .user_id
            .as_deref()
            .ok_or(WebhookError::MissingMetadata("userId"))?
            .parse()
            .map_err(|_| WebhookError::MissingMetadata("userId"))?;
        let product_id = self
            .product_id
            .as_deref()
            .ok_or(WebhookError::MissingMetadata("productId"))?
            .parse()
            .map_err(|_| WebhookError::MissingMetadata("productId"))?;
        Ok(EventMetadata {
            user_id,
            product_id,
        })
    }

    fn parse_optional(&self) -> Option<EventMetadata> {
        self.parse().ok()
    }
}

fn unix_ts(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// Wire shapes, capturing only the fields the engine consumes.

#[derive(Debug, Clone, Deserialize)]
struct WireCheckoutSession {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: WireMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct WireSubscription {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    status: String,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    canceled_at: Option<i64>,
    #[serde(default)]
    trial_start: Option<i64>,
    #[serde(default)]
    trial_end: Option<i64>,
    #[serde(default)]
    metadata: WireMetadata,
}

#[derive(Debug, Clone, Deserialize)]
struct WireInvoice {
    id: String,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    amount_due: i64,
    currency: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireCharge {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
}

/// A completed checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub metadata: EventMetadata,
    pub customer_id: Option<String>,
    /// Present for subscription-mode checkouts; authoritative state for those
    /// arrives via the subscription lifecycle events.
    pub subscription_id: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_total: i64,
    pub currency: String,
}

impl CheckoutCompleted {
    /// True when this checkout started a subscription rather than a
    /// one-time purchase.
    pub fn is_subscription_mode(&self) -> bool {
        self.subscription_id.is_some()
    }
}

/// Subscription lifecycle payload shared by created/updated/deleted events.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    pub provider_subscription_id: String,
    pub customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    /// Absent when the subscription was created outside the platform's
    /// checkout flow; handlers fall back to the stored subscription row.
    pub metadata: Option<EventMetadata>,
}

impl SubscriptionEvent {
    /// Metadata is mandatory for events that create ledger state.
    pub fn require_metadata(&self) -> Result<EventMetadata, WebhookError> {
        self.metadata.ok_or(WebhookError::MissingMetadata("userId"))
    }
}

/// Invoice payment outcome payload.
#[derive(Debug, Clone)]
pub struct InvoiceEvent {
    pub invoice_id: String,
    /// Absent for invoices unrelated to a subscription; those are ignored.
    pub provider_subscription_id: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
}

/// Refunded charge payload.
#[derive(Debug, Clone)]
pub struct ChargeRefunded {
    pub charge_id: String,
    pub payment_intent: Option<String>,
}

/// Decoded provider event, one variant per business transition.
///
/// The exhaustive `match` over this union replaces stringly-typed dispatch;
/// adding an event type without a handler fails to compile.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionCreated(SubscriptionEvent),
    SubscriptionUpdated(SubscriptionEvent),
    SubscriptionDeleted(SubscriptionEvent),
    InvoicePaymentSucceeded(InvoiceEvent),
    InvoicePaymentFailed(InvoiceEvent),
    ChargeRefunded(ChargeRefunded),
}

impl BillingEvent {
    /// Decode a verified envelope into a typed event.
    ///
    /// Returns `WebhookError::Ignored` for event types the engine does not
    /// react to, `Parse`/`MissingMetadata` when a handled type carries an
    /// unusable payload.
    pub fn decode(event: &ProviderEvent) -> Result<Self, WebhookError> {
        match event.parsed_type() {
            ProviderEventType::CheckoutSessionCompleted => {
                let wire: WireCheckoutSession = decode_object(event)?;
                Ok(Self::CheckoutCompleted(CheckoutCompleted {
                    session_id: wire.id,
                    metadata: wire.metadata.parse()?,
                    customer_id: wire.customer,
                    subscription_id: wire.subscription,
                    payment_intent: wire.payment_intent,
                    amount_total: wire.amount_total.unwrap_or(0),
                    currency: wire.currency.unwrap_or_else(|| "USD".to_string()),
                }))
            }
            ProviderEventType::SubscriptionCreated => {
                Ok(Self::SubscriptionCreated(decode_subscription(event)?))
            }
            ProviderEventType::SubscriptionUpdated => {
                Ok(Self::SubscriptionUpdated(decode_subscription(event)?))
            }
            ProviderEventType::SubscriptionDeleted => {
                Ok(Self::SubscriptionDeleted(decode_subscription(event)?))
            }
            ProviderEventType::InvoicePaymentSucceeded => {
                Ok(Self::InvoicePaymentSucceeded(decode_invoice(event)?))
            }
            ProviderEventType::InvoicePaymentFailed => {
                Ok(Self::InvoicePaymentFailed(decode_invoice(event)?))
            }
            ProviderEventType::ChargeRefunded => {
                let wire: WireCharge = decode_object(event)?;
                Ok(Self::ChargeRefunded(ChargeRefunded {
                    charge_id: wire.id,
                    payment_intent: wire.payment_intent,
                }))
            }
            ProviderEventType::Unknown => Err(WebhookError::Ignored(format!(
                "unhandled event type: {}",
                event.event_type
            ))),
        }
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(event: &ProviderEvent) -> Result<T, WebhookError> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| WebhookError::Parse(format!("{}: {}", event.event_type, e)))
}

fn decode_subscription(event: &ProviderEvent) -> Result<SubscriptionEvent, WebhookError> {
    let wire: WireSubscription = decode_object(event)?;
    let status = SubscriptionStatus::from_wire(&wire.status).ok_or(WebhookError::Parse(format!(
        "unknown subscription status: {}",
        wire.status
    )))?;

    Ok(SubscriptionEvent {
        provider_subscription_id: wire.id,
        customer_id: wire.customer,
        status,
        current_period_start: wire.current_period_start.and_then(unix_ts),
        current_period_end: wire.current_period_end.and_then(unix_ts),
        cancel_at_period_end: wire.cancel_at_period_end,
        canceled_at: wire.canceled_at.and_then(unix_ts),
        trial_start: wire.trial_start.and_then(unix_ts),
        trial_end: wire.trial_end.and_then(unix_ts),
        metadata: wire.metadata.parse_optional(),
    })
}

fn decode_invoice(event: &ProviderEvent) -> Result<InvoiceEvent, WebhookError> {
    let wire: WireInvoice = decode_object(event)?;
    Ok(InvoiceEvent {
        invoice_id: wire.id,
        provider_subscription_id: wire.subscription,
        payment_intent: wire.payment_intent,
        amount_paid: wire.amount_paid,
        amount_due: wire.amount_due,
        currency: wire.currency.to_uppercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::provider_event::ProviderEventBuilder;
    use serde_json::json;

    #[test]
    fn decode_one_time_checkout() {
        let event = ProviderEventBuilder::new()
            .event_type("checkout.session.completed")
            .object(json!({
                "id": "cs_1",
                "payment_intent": "pi_1",
                "amount_total": 4999,
                "currency": "usd",
                "metadata": { "userId": "7", "productId": "3" }
            }))
            .build();

        let decoded = BillingEvent::decode(&event).unwrap();
        match decoded {
            BillingEvent::CheckoutCompleted(c) => {
                assert!(!c.is_subscription_mode());
                assert_eq!(c.metadata.user_id, UserId::new(7));
                assert_eq!(c.metadata.product_id, ProductId::new(3));
                assert_eq!(c.amount_total, 4999);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn decode_subscription_mode_checkout() {
        let event = ProviderEventBuilder::new()
            .event_type("checkout.session.completed")
            .object(json!({
                "id": "cs_2",
                "subscription": "sub_1",
                "metadata": { "userId": "7", "productId": "3" }
            }))
            .build();

        match BillingEvent::decode(&event).unwrap() {
            BillingEvent::CheckoutCompleted(c) => {
                assert!(c.is_subscription_mode());
                assert_eq!(c.subscription_id.as_deref(), Some("sub_1"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn checkout_without_metadata_is_rejected() {
        let event = ProviderEventBuilder::new()
            .event_type("checkout.session.completed")
            .object(json!({ "id": "cs_3" }))
            .build();

        assert!(matches!(
            BillingEvent::decode(&event),
            Err(WebhookError::MissingMetadata(_))
        ));
    }

    #[test]
    fn decode_subscription_created_with_metadata() {
        let event = ProviderEventBuilder::new()
            .event_type("customer.subscription.created")
            .object(json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "active",
                "current_period_start": 1704067200,
                "current_period_end": 1706745600,
                "metadata": { "userId": "7", "productId": "3" }
            }))
            .build();

        match BillingEvent::decode(&event).unwrap() {
            BillingEvent::SubscriptionCreated(s) => {
                assert_eq!(s.provider_subscription_id, "sub_1");
                assert_eq!(s.status, SubscriptionStatus::Active);
                assert!(s.metadata.is_some());
                assert!(s.current_period_start.is_some());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn subscription_event_tolerates_absent_metadata() {
        let event = ProviderEventBuilder::new()
            .event_type("customer.subscription.updated")
            .object(json!({ "id": "sub_1", "status": "past_due" }))
            .build();

        match BillingEvent::decode(&event).unwrap() {
            BillingEvent::SubscriptionUpdated(s) => {
                assert!(s.metadata.is_none());
                assert!(s.require_metadata().is_err());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_subscription_status_is_a_parse_error() {
        let event = ProviderEventBuilder::new()
            .event_type("customer.subscription.updated")
            .object(json!({ "id": "sub_1", "status": "paused" }))
            .build();

        assert!(matches!(
            BillingEvent::decode(&event),
            Err(WebhookError::Parse(_))
        ));
    }

    #[test]
    fn decode_invoice_uppercases_currency() {
        let event = ProviderEventBuilder::new()
            .event_type("invoice.payment_failed")
            .object(json!({
                "id": "in_1",
                "subscription": "sub_1",
                "amount_due": 1999,
                "currency": "usd"
            }))
            .build();

        match BillingEvent::decode(&event).unwrap() {
            BillingEvent::InvoicePaymentFailed(i) => {
                assert_eq!(i.currency, "USD");
                assert_eq!(i.amount_due, 1999);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        let event = ProviderEventBuilder::new()
            .event_type("customer.created")
            .build();

        assert!(matches!(
            BillingEvent::decode(&event),
            Err(WebhookError::Ignored(_))
        ));
    }
}
