use std::sync::Arc;

use crate::config::Config;
use crate::currency::CurrencyConverter;
use crate::domain::{
    BalanceDiscrepancy, BalanceView, Cents, HistoryQuery, Operation, OperationPage, UserId,
};
use crate::storage::{LedgerStore, SqliteLedger, StoreError};

use super::AppError;

/// Application service for per-user balances.
/// This is the primary interface for any client (CLI, HTTP, etc.).
///
/// Holds no balance state of its own: every read and write goes to the store.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn LedgerStore>,
    converter: Arc<dyn CurrencyConverter>,
    base_currency: String,
}

impl AccountService {
    /// Create a new account service.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        converter: Arc<dyn CurrencyConverter>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            converter,
            base_currency: base_currency.into().to_uppercase(),
        }
    }

    /// Open (and migrate) the SQLite ledger and rate service described by `config`.
    pub async fn init(config: &Config) -> Result<Self, AppError> {
        let store = SqliteLedger::init(&config.database_url, config.database_max_connections)
            .await
            .map_err(AppError::Database)?;
        let converter = config.converter().map_err(|err| {
            AppError::Configuration(
                anyhow::Error::new(err).context("Failed to set up currency converter"),
            )
        })?;

        Ok(Self::new(Arc::new(store), converter, &config.base_currency))
    }

    /// Currency balances are stored in.
    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    // ========================
    // Balance operations
    // ========================

    /// Get a balance, converted to `currency` when one other than the base is requested.
    ///
    /// Conversion is best effort: if the provider fails, the stored amount is
    /// returned in the base currency and the view says so.
    pub async fn get_balance_by_user_id(
        &self,
        user_id: UserId,
        currency: Option<&str>,
    ) -> Result<BalanceView, AppError> {
        let balance = self.store.get_balance(user_id).await.map_err(|err| {
            Self::log_failure(&err, user_id, "get balance");
            AppError::from(err)
        })?;

        let base_view = BalanceView {
            user_id,
            amount: balance as f64,
            currency: self.base_currency.clone(),
        };

        let target = match currency.map(str::trim) {
            Some(code) if !code.is_empty() && !code.eq_ignore_ascii_case(&self.base_currency) => {
                code.to_uppercase()
            }
            _ => return Ok(base_view),
        };

        match self
            .converter
            .convert(balance, &self.base_currency, &target)
            .await
        {
            Ok(amount) => Ok(BalanceView {
                user_id,
                amount,
                currency: target,
            }),
            Err(err) => {
                tracing::warn!(
                    user_id,
                    from = %self.base_currency,
                    to = %target,
                    error = %err,
                    "Currency conversion failed, returning base currency"
                );
                Ok(base_view)
            }
        }
    }

    /// Credit a user, opening their balance first if they have none.
    pub async fn increase_balance(
        &self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<Operation, AppError> {
        Self::validate_amount(amount)?;

        match self.store.get_balance(user_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                // Idempotent, so a concurrent first credit cannot fail this one.
                self.store.ensure_balance(user_id).await.map_err(|err| {
                    Self::log_failure(&err, user_id, "open balance");
                    AppError::from(err)
                })?;
            }
            Err(err) => {
                Self::log_failure(&err, user_id, "increase balance");
                return Err(err.into());
            }
        }

        let operation = self.store.credit(user_id, amount).await.map_err(|err| {
            Self::log_failure(&err, user_id, "increase balance");
            AppError::from(err)
        })?;

        tracing::info!(user_id, amount, operation_id = operation.id, "Balance increased");
        Ok(operation)
    }

    /// Debit a user. The balance must exist and cover `amount`.
    pub async fn decrease_balance(
        &self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<Operation, AppError> {
        Self::validate_amount(amount)?;

        let balance = self.store.get_balance(user_id).await.map_err(|err| {
            Self::log_failure(&err, user_id, "decrease balance");
            AppError::from(err)
        })?;

        if amount > balance {
            tracing::warn!(user_id, amount, balance, "Rejected debit: not enough money");
            return Err(AppError::wrong_input("not enough money"));
        }

        // The store re-checks atomically; a concurrent debit may still win.
        let operation = self.store.debit(user_id, amount).await.map_err(|err| {
            Self::log_failure(&err, user_id, "decrease balance");
            AppError::from(err)
        })?;

        tracing::info!(user_id, amount, operation_id = operation.id, "Balance decreased");
        Ok(operation)
    }

    /// Move money between two existing balances as one atomic unit.
    pub async fn transfer_money(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        amount: Cents,
    ) -> Result<Operation, AppError> {
        Self::validate_amount(amount)?;
        if sender_id == recipient_id {
            return Err(AppError::wrong_input("sender and recipient must differ"));
        }

        let operation = self
            .store
            .transfer(sender_id, recipient_id, amount)
            .await
            .map_err(|err| {
                Self::log_failure(&err, sender_id, "transfer money");
                AppError::from(err)
            })?;

        tracing::info!(
            sender_id,
            recipient_id,
            amount,
            operation_id = operation.id,
            "Money transferred"
        );
        Ok(operation)
    }

    // ========================
    // History operations
    // ========================

    /// The most recent `limit` operations of a user.
    pub async fn get_operations_by_id(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Operation>, AppError> {
        let page = self
            .get_operations(user_id, HistoryQuery::with_limit(limit))
            .await?;
        Ok(page.operations)
    }

    /// A page of a user's operations. Fails with `NotFound` if the user has no balance.
    pub async fn get_operations(
        &self,
        user_id: UserId,
        query: HistoryQuery,
    ) -> Result<OperationPage, AppError> {
        if query.limit == 0 || query.limit > HistoryQuery::MAX_LIMIT {
            return Err(AppError::wrong_input(format!(
                "limit must be between 1 and {}",
                HistoryQuery::MAX_LIMIT
            )));
        }
        if query.page == 0 {
            return Err(AppError::wrong_input("page must be at least 1"));
        }

        let history = match self.store.get_balance(user_id).await {
            Ok(_) => self.store.get_operation_history(user_id, query).await,
            Err(err) => Err(err),
        };

        history.map_err(|err| {
            Self::log_failure(&err, user_id, "get operations");
            AppError::from(err)
        })
    }

    // ========================
    // Integrity operations
    // ========================

    /// Balances that do not match their operation log. Empty when the ledger is consistent.
    pub async fn check_integrity(&self) -> Result<Vec<BalanceDiscrepancy>, AppError> {
        let discrepancies = self.store.find_discrepancies().await.map_err(|err| {
            tracing::error!(error = %err, "Failed to audit balances");
            AppError::from(err)
        })?;

        for discrepancy in &discrepancies {
            tracing::error!(
                user_id = discrepancy.user_id,
                stored = discrepancy.stored,
                derived = discrepancy.derived,
                "Balance does not match operation log"
            );
        }
        Ok(discrepancies)
    }

    fn validate_amount(amount: Cents) -> Result<(), AppError> {
        if amount < 1 {
            return Err(AppError::wrong_input("amount must be positive"));
        }
        Ok(())
    }

    /// Database failures are logged with their cause; the caller only sees an opaque error.
    fn log_failure(err: &StoreError, user_id: UserId, operation: &str) {
        match err {
            StoreError::Database(cause) => {
                tracing::error!(user_id, operation, error = ?cause, "Database failure");
            }
            other => {
                tracing::debug!(user_id, operation, error = %other, "Request rejected");
            }
        }
    }
}
