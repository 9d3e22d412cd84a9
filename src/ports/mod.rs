//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `WebhookEventStore` - dedup registry for webhook deliveries
//! - `LedgerStore` - transactional subscription/entitlement/payment storage
//! - `AuditLog` - append-only audit trail
//! - `OperatorNotifier` - best-effort operator alerts
//! - `CheckoutProvider` - outbound session creation at the payment provider

mod audit_log;
mod checkout;
mod ledger_store;
mod notifier;
mod webhook_event_store;

pub use audit_log::AuditLog;
pub use checkout::{
    CheckoutMode, CheckoutProvider, CheckoutSession, CreateCheckoutRequest, PaymentError,
    PaymentErrorCode, PortalSession,
};
pub use ledger_store::{LedgerStore, MutationOutcome, UpdateOutcome};
pub use notifier::{OperatorNotification, OperatorNotifier};
pub use webhook_event_store::{
    Admission, ProcessingOutcome, WebhookEventStore, IN_FLIGHT_GRACE_SECS,
};
