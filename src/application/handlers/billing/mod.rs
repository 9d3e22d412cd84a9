//! Billing command handlers.

mod create_checkout_session;
mod create_portal_session;
mod process_webhook;

pub use create_checkout_session::{CreateCheckoutSessionCommand, CreateCheckoutSessionHandler};
pub use create_portal_session::{CreatePortalSessionCommand, CreatePortalSessionHandler};
pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult};
