//! HTTP adapter for the billing module.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::BillingAppState;
pub use routes::{billing_router, billing_routes, webhook_routes};
