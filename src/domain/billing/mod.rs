//! Billing domain: subscriptions, entitlements, payments, and the webhook
//! event model that drives them.

mod audit;
mod entitlement;
mod event_data;
mod payment;
mod provider_event;
mod subscription;
mod webhook_errors;
mod webhook_verifier;

pub use audit::{AuditEntry, Severity};
pub use entitlement::{Entitlement, EntitlementStatus, GrantSource};
pub use event_data::{
    BillingEvent, ChargeRefunded, CheckoutCompleted, EventMetadata, InvoiceEvent,
    SubscriptionEvent,
};
pub use payment::{NewPayment, Payment, PaymentStatus, ProductKind};
pub use provider_event::{ProviderEvent, ProviderEventData, ProviderEventType};
pub use subscription::{NewSubscription, Subscription, SubscriptionStatus, SubscriptionUpdate};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{SignatureHeader, WebhookVerifier};

#[cfg(test)]
pub use provider_event::ProviderEventBuilder;
#[cfg(test)]
pub use webhook_verifier::compute_test_signature;
