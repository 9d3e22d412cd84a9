//! Payment provider configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Payment configuration (Stripe)
///
/// The API key is optional: a deployment without one still consumes webhooks
/// and serves reads, and outbound checkout calls return a typed
/// `NotConfigured` error. The webhook signing secret is always required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret API key (sk_test_... or sk_live_...)
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (whsec_...)
    pub stripe_webhook_secret: String,
}

impl PaymentConfig {
    /// Check if outbound provider calls are configured
    pub fn has_api_key(&self) -> bool {
        self.stripe_api_key.is_some()
    }

    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key
            .as_deref()
            .is_some_and(|k| k.starts_with("sk_test_"))
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if let Some(key) = self.stripe_api_key.as_deref() {
            if !key.starts_with("sk_") {
                return Err(ValidationError::InvalidStripeKey);
            }
        }
        Ok(())
    }
}
