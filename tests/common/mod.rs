// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use balance_ledger::currency::{ConversionError, CurrencyConverter, DisabledConverter};
use balance_ledger::{AccountService, Cents, SqliteLedger, UserId};
use tempfile::TempDir;

/// A service over a fresh temporary database, plus direct access to its store.
pub struct TestLedger {
    pub service: AccountService,
    pub store: Arc<SqliteLedger>,
    _temp_dir: TempDir,
}

impl TestLedger {
    pub async fn new() -> Result<Self> {
        Self::with_converter(Arc::new(DisabledConverter)).await
    }

    pub async fn with_converter(converter: Arc<dyn CurrencyConverter>) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");
        let url = format!("sqlite:{}?mode=rwc", db_path.display());

        let store = Arc::new(SqliteLedger::init(&url, 5).await?);
        let service = AccountService::new(store.clone(), converter, "RUB");

        Ok(Self {
            service,
            store,
            _temp_dir: temp_dir,
        })
    }

    /// Open a balance for `user_id` holding `amount`.
    pub async fn fund(&self, user_id: UserId, amount: Cents) -> Result<()> {
        self.service.increase_balance(user_id, amount).await?;
        Ok(())
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Cents> {
        let view = self.service.get_balance_by_user_id(user_id, None).await?;
        Ok(view.amount as Cents)
    }
}

/// Converter with a fixed rate per base unit.
pub struct FixedRateConverter {
    pub rate: f64,
}

#[async_trait]
impl CurrencyConverter for FixedRateConverter {
    async fn convert(
        &self,
        amount: Cents,
        _base_currency: &str,
        _target_currency: &str,
    ) -> Result<f64, ConversionError> {
        Ok(amount as f64 * self.rate)
    }
}

/// Converter whose provider is always down.
pub struct FailingConverter;

#[async_trait]
impl CurrencyConverter for FailingConverter {
    async fn convert(
        &self,
        _amount: Cents,
        _base_currency: &str,
        _target_currency: &str,
    ) -> Result<f64, ConversionError> {
        Err(ConversionError::Api {
            status: 503,
            message: "rate service unavailable".into(),
        })
    }
}
