//! Entitlement Sync - Subscription/entitlement synchronization engine.
//!
//! Consumes at-least-once, possibly out-of-order webhook events from the
//! payment provider and converts them into authoritative entitlement state.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
