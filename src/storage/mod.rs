mod error;
mod sqlite;

use async_trait::async_trait;

pub use error::*;
pub use sqlite::*;

use crate::domain::{BalanceDiscrepancy, Cents, HistoryQuery, Operation, OperationPage, UserId};

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Durable storage of balances and the operation log.
///
/// Every method that changes a balance appends exactly one [`Operation`] in the
/// same transaction and returns it. Amounts are validated by the caller; the
/// store only guards against a balance going negative.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a zero balance. Fails with `AlreadyExists` if the user has one.
    async fn create_balance(&self, user_id: UserId) -> Result<(), StoreError>;

    /// Insert a zero balance unless one exists. Returns true if a row was created.
    async fn ensure_balance(&self, user_id: UserId) -> Result<bool, StoreError>;

    async fn credit(&self, user_id: UserId, amount: Cents) -> Result<Operation, StoreError>;

    async fn debit(&self, user_id: UserId, amount: Cents) -> Result<Operation, StoreError>;

    /// Move `amount` from sender to recipient as a single unit.
    async fn transfer(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        amount: Cents,
    ) -> Result<Operation, StoreError>;

    async fn get_balance(&self, user_id: UserId) -> Result<Cents, StoreError>;

    /// Operations where the user is sender or recipient, plus the total count.
    async fn get_operation_history(
        &self,
        user_id: UserId,
        query: HistoryQuery,
    ) -> Result<OperationPage, StoreError>;

    /// Balances whose stored value differs from the sum of their operations.
    async fn find_discrepancies(&self) -> Result<Vec<BalanceDiscrepancy>, StoreError>;
}
