//! Payment entity - append-only financial facts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, ProductId, SubscriptionId, UserId};

/// Terminal payment outcome. Rows are immutable once written; an explicit
/// refund event is the only permitted status correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

/// What kind of product the payment was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Subscription,
    DigitalProduct,
    Bundle,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::DigitalProduct => "digital_product",
            Self::Bundle => "bundle",
        }
    }
}

/// A recorded financial event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    /// Amount in minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub product_kind: ProductKind,
    pub product_id: ProductId,
    pub subscription_id: Option<SubscriptionId>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for recording a new payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: UserId,
    pub amount: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub product_kind: ProductKind,
    pub product_id: ProductId,
    pub subscription_id: Option<SubscriptionId>,
    pub metadata: serde_json::Value,
}
