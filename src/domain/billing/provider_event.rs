//! Provider webhook event envelope.
//!
//! The provider delivers every notification wrapped in the same envelope;
//! only the fields the engine consumes are captured here.

use serde::{Deserialize, Serialize};

/// Raw webhook event as delivered by the payment provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEvent {
    /// Unique identifier for the event (evt_xxx format). The dedup key.
    pub id: String,

    /// Type of event (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the provider created the event (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: ProviderEventData,

    /// Whether this is a live mode event (vs test mode).
    #[serde(default)]
    pub livemode: bool,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEventData {
    /// The object that triggered the event (shape depends on event type).
    pub object: serde_json::Value,

    /// Previous values for updated attributes (only for update events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl ProviderEvent {
    /// Parse the event type into a known enum variant.
    pub fn parsed_type(&self) -> ProviderEventType {
        ProviderEventType::from_wire(&self.event_type)
    }
}

/// Known provider event types the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventType {
    /// Checkout session completed successfully.
    CheckoutSessionCompleted,
    /// Subscription was created at the provider.
    SubscriptionCreated,
    /// Subscription status or period fields changed.
    SubscriptionUpdated,
    /// Subscription was deleted/ended.
    SubscriptionDeleted,
    /// Recurring invoice payment succeeded.
    InvoicePaymentSucceeded,
    /// Recurring invoice payment failed.
    InvoicePaymentFailed,
    /// A charge was refunded.
    ChargeRefunded,
    /// Unknown or unhandled event type.
    Unknown,
}

impl ProviderEventType {
    /// Parse an event type from the wire representation.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "charge.refunded" => Self::ChargeRefunded,
            _ => Self::Unknown,
        }
    }

    /// Wire representation of the event type.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::ChargeRefunded => "charge.refunded",
            Self::Unknown => "unknown",
        }
    }
}

/// Builder for creating test ProviderEvent instances.
#[cfg(test)]
pub struct ProviderEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl Default for ProviderEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_1".to_string(),
            event_type: "checkout.session.completed".to_string(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            livemode: false,
        }
    }
}

#[cfg(test)]
impl ProviderEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> ProviderEvent {
        ProviderEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: ProviderEventData {
                object: self.object,
                previous_attributes: None,
            },
            livemode: self.livemode,
        }
    }
}
