//! Runtime configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::currency::{ConversionError, CurrencyConverter, DisabledConverter, ExchangeRatesClient};

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL (default: `sqlite:balance.db?mode=rwc`).
    pub database_url: String,

    /// Connection pool size (default: 5).
    pub database_max_connections: u32,

    /// Currency balances are stored in (default: "RUB").
    pub base_currency: String,

    /// Rate service root URL.
    pub exchange_api_url: String,

    /// Rate service API key. Conversion is disabled without one.
    pub exchange_api_key: Option<String>,

    /// Rate service request timeout in seconds (default: 10).
    pub exchange_timeout_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            base_currency: std::env::var("BASE_CURRENCY")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(defaults.base_currency),
            exchange_api_url: std::env::var("EXCHANGE_API_URL")
                .unwrap_or(defaults.exchange_api_url),
            exchange_api_key: std::env::var("EXCHANGE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            exchange_timeout_seconds: std::env::var("EXCHANGE_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.exchange_timeout_seconds),
        }
    }

    /// Point the ledger at a database file, creating it if missing.
    #[must_use]
    pub fn with_database_path(mut self, path: &str) -> Self {
        self.database_url = format!("sqlite:{path}?mode=rwc");
        self
    }

    /// Build the converter this configuration describes.
    pub fn converter(&self) -> Result<Arc<dyn CurrencyConverter>, ConversionError> {
        match &self.exchange_api_key {
            Some(api_key) => {
                tracing::info!(url = %self.exchange_api_url, "Currency conversion enabled");
                let client = ExchangeRatesClient::new(
                    self.exchange_api_url.clone(),
                    api_key.clone(),
                    Duration::from_secs(self.exchange_timeout_seconds),
                )?;
                Ok(Arc::new(client))
            }
            None => {
                tracing::debug!("EXCHANGE_API_KEY not set - balances shown in base currency only");
                Ok(Arc::new(DisabledConverter))
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:balance.db?mode=rwc".into(),
            database_max_connections: 5,
            base_currency: "RUB".into(),
            exchange_api_url: "https://api.apilayer.com/exchangerates_data".into(),
            exchange_api_key: None,
            exchange_timeout_seconds: 10,
        }
    }
}
