//! Service entrypoint.
//!
//! Wires configuration, the PostgreSQL pool, and the adapters into the
//! billing router, then serves HTTP until shutdown.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use entitlement_sync::adapters::http::{billing_router, BillingAppState};
use entitlement_sync::adapters::notification::{NotifierConfig, WebhookNotifier};
use entitlement_sync::adapters::postgres::{
    PostgresAuditLog, PostgresLedgerStore, PostgresWebhookEventStore,
};
use entitlement_sync::adapters::stripe::{StripeCheckoutClient, StripeClientConfig};
use entitlement_sync::config::AppConfig;
use entitlement_sync::ports::WebhookEventStore;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("entitlement-sync exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;
    info!("database connection established");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("migrations applied");
    }

    // Processed events are kept for 30 days for replay inspection, then
    // swept daily.
    let retention_store = PostgresWebhookEventStore::new(pool.clone());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(30);
            match retention_store.delete_before(cutoff).await {
                Ok(deleted) if deleted > 0 => info!(deleted, "swept processed webhook events"),
                Ok(_) => {}
                Err(err) => error!(error = %err, "webhook event sweep failed"),
            }
        }
    });

    let checkout_provider = match config.payment.stripe_api_key.as_deref() {
        Some(key) => StripeCheckoutClient::new(StripeClientConfig::new(key)),
        None => StripeCheckoutClient::new(StripeClientConfig::unconfigured()),
    };

    let state = BillingAppState {
        events: Arc::new(PostgresWebhookEventStore::new(pool.clone())),
        ledger: Arc::new(PostgresLedgerStore::new(pool.clone())),
        audit: Arc::new(PostgresAuditLog::new(pool.clone())),
        notifier: Arc::new(WebhookNotifier::new(NotifierConfig {
            webhook_url: config.notification.webhook_url.clone(),
        })),
        checkout_provider: Arc::new(checkout_provider),
        webhook_secret: config.payment.stripe_webhook_secret.clone(),
    };

    let app = billing_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
