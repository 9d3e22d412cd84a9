//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers and error types that form the vocabulary
//! of the billing domain.

mod errors;
mod ids;

pub use errors::{DomainError, ErrorCode};
pub use ids::{EntitlementId, PaymentId, ProductId, SubscriptionId, UserId};
