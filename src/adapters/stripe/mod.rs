//! Stripe adapter.
//!
//! Implements the `CheckoutProvider` port against the Stripe REST API.
//! Webhook signature verification lives in the domain layer; this adapter
//! only makes outbound calls.

mod checkout_client;

pub use checkout_client::{StripeCheckoutClient, StripeClientConfig};
