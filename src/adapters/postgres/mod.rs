//! PostgreSQL adapters - sqlx-backed implementations of the storage ports.

mod audit_log;
mod ledger_store;
mod webhook_event_store;

pub use audit_log::PostgresAuditLog;
pub use ledger_store::PostgresLedgerStore;
pub use webhook_event_store::PostgresWebhookEventStore;
