//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `ENTITLEMENT_SYNC` prefix and nested values use double underscores as
//! separators.
//!
//! # Example
//!
//! ```no_run
//! use entitlement_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod notification;
mod payment;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use notification::NotificationConfig;
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment configuration (Stripe)
    pub payment: PaymentConfig,

    /// Operator notification configuration
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads a `.env` file if present, then reads environment variables with
    /// the `ENTITLEMENT_SYNC` prefix:
    ///
    /// - `ENTITLEMENT_SYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ENTITLEMENT_SYNC__DATABASE__URL=...` -> `database.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ENTITLEMENT_SYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.notification.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global, so these tests serialize on a mutex.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var(
            "ENTITLEMENT_SYNC__DATABASE__URL",
            "postgresql://test@localhost/test",
        );
        env::set_var(
            "ENTITLEMENT_SYNC__PAYMENT__STRIPE_WEBHOOK_SECRET",
            "whsec_xxx",
        );
    }

    fn clear_env() {
        env::remove_var("ENTITLEMENT_SYNC__DATABASE__URL");
        env::remove_var("ENTITLEMENT_SYNC__PAYMENT__STRIPE_WEBHOOK_SECRET");
        env::remove_var("ENTITLEMENT_SYNC__PAYMENT__STRIPE_API_KEY");
        env::remove_var("ENTITLEMENT_SYNC__SERVER__PORT");
        env::remove_var("ENTITLEMENT_SYNC__SERVER__ENVIRONMENT");
    }

    #[test]
    fn loads_minimal_config_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert!(config.validate().is_ok());
        assert!(!config.payment.has_api_key());
    }

    #[test]
    fn server_defaults_apply_when_unset() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn production_environment_is_detected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("ENTITLEMENT_SYNC__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        assert!(result.unwrap().is_production());
    }

    #[test]
    fn custom_port_overrides_default() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("ENTITLEMENT_SYNC__SERVER__PORT", "3000");
        let result = AppConfig::load();
        clear_env();

        assert_eq!(result.unwrap().server.port, 3000);
    }
}
