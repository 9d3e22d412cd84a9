//! In-memory adapters backing the ports.
//!
//! Used by tests and local development; they mirror the Postgres adapters'
//! semantics, including admission atomicity and the entitlement agreement
//! rules, without a database.

mod audit_log;
mod ledger_store;
mod notifier;
mod webhook_event_store;

pub use audit_log::InMemoryAuditLog;
pub use ledger_store::InMemoryLedgerStore;
pub use notifier::InMemoryNotifier;
pub use webhook_event_store::{InMemoryWebhookEventStore, StoredWebhookEvent};
