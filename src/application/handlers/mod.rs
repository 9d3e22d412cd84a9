//! Application handlers.
//!
//! Command handlers that orchestrate domain operations.

pub mod billing;

pub use billing::{
    CreateCheckoutSessionCommand, CreateCheckoutSessionHandler, CreatePortalSessionCommand,
    CreatePortalSessionHandler, ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
};
