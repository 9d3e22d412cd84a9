//! CreatePortalSessionHandler - opens the provider's billing portal for an
//! existing customer.

use std::sync::Arc;

use crate::ports::{CheckoutProvider, PaymentError, PortalSession};

/// Command to create a billing portal session.
#[derive(Debug, Clone)]
pub struct CreatePortalSessionCommand {
    /// Provider customer id recorded on the user's subscription.
    pub customer_id: String,
    pub return_url: String,
}

pub struct CreatePortalSessionHandler {
    provider: Arc<dyn CheckoutProvider>,
}

impl CreatePortalSessionHandler {
    pub fn new(provider: Arc<dyn CheckoutProvider>) -> Self {
        Self { provider }
    }

    pub async fn handle(
        &self,
        cmd: CreatePortalSessionCommand,
    ) -> Result<PortalSession, PaymentError> {
        self.provider
            .create_portal_session(&cmd.customer_id, &cmd.return_url)
            .await
    }
}
