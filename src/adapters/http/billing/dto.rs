//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::ports::CheckoutMode;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a provider checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequestDto {
    /// The purchasing user.
    pub user_id: i64,
    /// The product being bought.
    pub product_id: i64,
    /// `subscription` for recurring billing, `payment` for a one-time purchase.
    pub mode: CheckoutMode,
    /// Provider price identifier for the product.
    pub price_id: String,
    /// URL to redirect after successful checkout.
    pub success_url: String,
    /// URL to redirect after cancelled checkout.
    pub cancel_url: String,
    /// Optional email to prefill at the provider.
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// Request to open the provider's billing portal.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePortalRequestDto {
    /// Provider customer id recorded on the user's subscription.
    pub customer_id: String,
    /// URL to return to after the portal session.
    pub return_url: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response with the checkout redirect URL.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
}

/// Response with the portal redirect URL.
#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Acknowledgement returned to the webhook sender.
///
/// `status` is one of `processed`, `already_processed`, or `ignored`; the
/// sender treats any 2xx as delivered, so the body exists for operators
/// replaying deliveries by hand.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
