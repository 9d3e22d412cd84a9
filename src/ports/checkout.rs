//! CheckoutProvider port - outbound calls to the payment provider.
//!
//! Covers session creation only; state changes flow back through webhooks.
//! The provider client is injected, and a deployment without credentials
//! surfaces a typed `NotConfigured` error instead of failing at call depth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode, ProductId, UserId};

/// Whether a checkout starts a subscription or a one-time purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Subscription,
    Payment,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Payment => "payment",
        }
    }
}

/// Request to create a checkout session.
///
/// `user_id` and `product_id` are embedded in the session metadata so that
/// the completion webhook is self-describing.
#[derive(Debug, Clone)]
pub struct CreateCheckoutRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub mode: CheckoutMode,
    /// Provider price identifier for the product.
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
}

/// Created checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// URL the customer is redirected to.
    pub url: String,
}

/// Created billing portal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Port for checkout and portal session creation.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Create a billing portal session for an existing provider customer.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError>;
}

/// Errors from provider operations.
#[derive(Debug, Clone)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    /// Provider's own error code, when it returned one.
    pub provider_code: Option<String>,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// The provider client was constructed without credentials.
    pub fn not_configured() -> Self {
        Self::new(
            PaymentErrorCode::NotConfigured,
            "payment provider is not configured",
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotConfigured => ErrorCode::ValidationFailed,
            PaymentErrorCode::NetworkError | PaymentErrorCode::RateLimitExceeded => {
                ErrorCode::InternalError
            }
            _ => ErrorCode::InternalError,
        };
        DomainError::new(code, err.message)
    }
}

/// Provider error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentErrorCode {
    /// No API credentials were supplied at startup.
    NotConfigured,
    /// Network connectivity issue.
    NetworkError,
    /// API authentication failed.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// The provider rejected the request.
    ProviderError,
}

impl PaymentErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::RateLimitExceeded)
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotConfigured => "not_configured",
            Self::NetworkError => "network_error",
            Self::AuthenticationError => "authentication_error",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
