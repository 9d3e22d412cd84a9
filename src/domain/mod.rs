//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, errors)
//! - `billing` - Webhook events, subscription/entitlement/payment entities,
//!   signature verification, and the webhook error taxonomy

pub mod billing;
pub mod foundation;
