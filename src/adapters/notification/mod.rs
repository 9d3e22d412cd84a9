//! Operator notification adapters.

mod webhook_notifier;

pub use webhook_notifier::{NotifierConfig, WebhookNotifier};
