//! Stripe checkout client.
//!
//! Implements the `CheckoutProvider` port against the Stripe REST API.
//! Constructed without an API key it still satisfies the port, returning the
//! typed `NotConfigured` error from every call; deployments without billing
//! credentials fail loudly at the call site instead of at startup.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::ports::{
    CheckoutProvider, CheckoutSession, CreateCheckoutRequest, PaymentError, PortalSession,
};

/// Stripe API configuration for outbound calls.
#[derive(Clone)]
pub struct StripeClientConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...). Absent when the
    /// deployment has no billing credentials.
    api_key: Option<SecretString>,

    /// Base URL for the Stripe API (overridable for testing).
    api_base_url: String,
}

impl StripeClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::new(api_key.into())),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Configuration for a deployment without billing credentials.
    pub fn unconfigured() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Stripe implementation of the CheckoutProvider port.
pub struct StripeCheckoutClient {
    config: StripeClientConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

/// Outbound Stripe calls block a user-facing request; a stuck connection
/// must surface as a typed network error, not an open socket.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl StripeCheckoutClient {
    pub fn new(config: StripeClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            http_client,
        }
    }

    fn api_key(&self) -> Result<&SecretString, PaymentError> {
        self.config.api_key.as_ref().ok_or_else(PaymentError::not_configured)
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<SessionResponse, PaymentError> {
        let api_key = self.api_key()?;
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .form(params)
            .send()
            .await
            .map_err(|e| PaymentError::network(format!("Stripe request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => PaymentError::new(
                    crate::ports::PaymentErrorCode::AuthenticationError,
                    "Stripe rejected the API key",
                ),
                429 => PaymentError::new(
                    crate::ports::PaymentErrorCode::RateLimitExceeded,
                    "Stripe rate limit exceeded",
                ),
                _ => PaymentError::provider(format!("Stripe API error ({}): {}", status, body)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::provider(format!("Failed to parse Stripe response: {}", e)))
    }
}

#[async_trait]
impl CheckoutProvider for StripeCheckoutClient {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let user_id = request.user_id.to_string();
        let product_id = request.product_id.to_string();

        let mut params = vec![
            ("mode", request.mode.as_str()),
            ("line_items[0][price]", request.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            // Completion webhooks carry these back, making the event
            // self-describing.
            ("metadata[userId]", user_id.as_str()),
            ("metadata[productId]", product_id.as_str()),
        ];
        if let Some(email) = request.customer_email.as_deref() {
            params.push(("customer_email", email));
        }
        if request.mode == crate::ports::CheckoutMode::Subscription {
            params.push(("subscription_data[metadata][userId]", user_id.as_str()));
            params.push(("subscription_data[metadata][productId]", product_id.as_str()));
        }

        let session = self.post_form("/v1/checkout/sessions", &params).await?;
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let session = self
            .post_form(
                "/v1/billing_portal/sessions",
                &[("customer", customer_id), ("return_url", return_url)],
            )
            .await?;
        Ok(PortalSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ProductId, UserId};
    use crate::ports::{CheckoutMode, PaymentErrorCode};

    #[tokio::test]
    async fn unconfigured_client_returns_typed_error() {
        let client = StripeCheckoutClient::new(StripeClientConfig::unconfigured());

        let err = client
            .create_checkout_session(CreateCheckoutRequest {
                user_id: UserId::new(7),
                product_id: ProductId::new(3),
                mode: CheckoutMode::Payment,
                price_id: "price_1".to_string(),
                success_url: "https://app.example.com/success".to_string(),
                cancel_url: "https://app.example.com/cancel".to_string(),
                customer_email: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::NotConfigured);
    }

    #[tokio::test]
    async fn unconfigured_portal_returns_typed_error() {
        let client = StripeCheckoutClient::new(StripeClientConfig::unconfigured());

        let err = client
            .create_portal_session("cus_1", "https://app.example.com/account")
            .await
            .unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::NotConfigured);
    }
}
