//! CreateCheckoutSessionHandler - starts a provider checkout for a product.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::domain::billing::AuditEntry;
use crate::domain::foundation::{ProductId, UserId};
use crate::ports::{
    AuditLog, CheckoutMode, CheckoutProvider, CheckoutSession, CreateCheckoutRequest, PaymentError,
};

/// Command to create a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionCommand {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub mode: CheckoutMode,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
}

/// Handler that creates checkout sessions at the payment provider.
///
/// The user and product ids ride along as session metadata so the completion
/// webhook can be tied back to an account without any session-side state.
pub struct CreateCheckoutSessionHandler {
    provider: Arc<dyn CheckoutProvider>,
    audit: Arc<dyn AuditLog>,
}

impl CreateCheckoutSessionHandler {
    pub fn new(provider: Arc<dyn CheckoutProvider>, audit: Arc<dyn AuditLog>) -> Self {
        Self { provider, audit }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutSessionCommand,
    ) -> Result<CheckoutSession, PaymentError> {
        let session = self
            .provider
            .create_checkout_session(CreateCheckoutRequest {
                user_id: cmd.user_id,
                product_id: cmd.product_id,
                mode: cmd.mode,
                price_id: cmd.price_id,
                success_url: cmd.success_url,
                cancel_url: cmd.cancel_url,
                customer_email: cmd.customer_email,
            })
            .await?;

        // Session creation is not a ledger transition; a missing trail entry
        // must not fail the checkout.
        if let Err(err) = self
            .audit
            .append(AuditEntry::info(
                cmd.user_id,
                "checkout_session_created",
                cmd.product_id,
                json!({ "session_id": session.id, "mode": cmd.mode.as_str() }),
            ))
            .await
        {
            warn!(error = %err, "failed to audit checkout session creation");
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryAuditLog;
    use crate::ports::PortalSession;
    use async_trait::async_trait;

    struct MockProvider {
        configured: bool,
    }

    #[async_trait]
    impl CheckoutProvider for MockProvider {
        async fn create_checkout_session(
            &self,
            request: CreateCheckoutRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            if !self.configured {
                return Err(PaymentError::not_configured());
            }
            Ok(CheckoutSession {
                id: "cs_123".to_string(),
                url: format!("https://checkout.example.com/cs_123?price={}", request.price_id),
            })
        }

        async fn create_portal_session(
            &self,
            _customer_id: &str,
            _return_url: &str,
        ) -> Result<PortalSession, PaymentError> {
            Ok(PortalSession {
                id: "ps_123".to_string(),
                url: "https://billing.example.com/ps_123".to_string(),
            })
        }
    }

    fn command() -> CreateCheckoutSessionCommand {
        CreateCheckoutSessionCommand {
            user_id: UserId::new(7),
            product_id: ProductId::new(3),
            mode: CheckoutMode::Payment,
            price_id: "price_1".to_string(),
            success_url: "https://app.example.com/success".to_string(),
            cancel_url: "https://app.example.com/cancel".to_string(),
            customer_email: None,
        }
    }

    #[tokio::test]
    async fn creates_session_and_audits() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let handler = CreateCheckoutSessionHandler::new(
            Arc::new(MockProvider { configured: true }),
            audit.clone(),
        );

        let session = handler.handle(command()).await.unwrap();

        assert_eq!(session.id, "cs_123");
        assert_eq!(audit.entries().len(), 1);
        assert_eq!(audit.entries()[0].action, "checkout_session_created");
    }

    #[tokio::test]
    async fn unconfigured_provider_surfaces_typed_error() {
        let handler = CreateCheckoutSessionHandler::new(
            Arc::new(MockProvider { configured: false }),
            Arc::new(InMemoryAuditLog::new()),
        );

        let err = handler.handle(command()).await.unwrap_err();

        assert_eq!(err.code, crate::ports::PaymentErrorCode::NotConfigured);
    }
}
