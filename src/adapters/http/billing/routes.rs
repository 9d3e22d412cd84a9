//! Axum router configuration for billing endpoints.
//!
//! This module defines the route structure for billing-related API endpoints
//! and wires them to their corresponding handlers.

use axum::{routing::post, Router};

use super::handlers::{create_checkout, create_portal, handle_provider_webhook, BillingAppState};

/// Create the billing API router.
///
/// # Routes
/// - `POST /checkout` - Start a provider checkout session
/// - `POST /portal` - Open the provider's billing portal
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/portal", post(create_portal))
}

/// Create the webhook router.
///
/// This is separate from the billing routes because webhook deliveries carry
/// no user authentication; they are verified via HMAC signature instead.
///
/// # Routes
/// - `POST /stripe` - Receive provider webhook deliveries
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_provider_webhook))
}

/// Create the complete billing module router.
///
/// Suitable for mounting at the application root; billing endpoints land
/// under `/api/billing` and webhook deliveries under `/webhooks`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/billing", billing_routes())
        .nest("/webhooks", webhook_routes())
}
