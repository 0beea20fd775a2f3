use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::domain::{
    BalanceDiscrepancy, Cents, HistoryQuery, Operation, OperationKind, OperationPage, UserId,
};

use super::{LedgerStore, MIGRATION_001_INITIAL, StoreError};

/// How long a writer waits for a competing transaction before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger store backed by SQLite.
///
/// Balance changes are single conditional `UPDATE` statements, so concurrent
/// writers on the same row cannot lose updates; SQLite serializes writers and
/// the condition is re-evaluated against the committed row.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Create a new store over an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database, e.g. `sqlite:balance.db?mode=rwc`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        tracing::debug!(database_url, max_connections, "Connected to ledger database");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, max_connections: u32) -> Result<Self> {
        let ledger = Self::connect(database_url, max_connections).await?;
        ledger.migrate().await?;
        Ok(ledger)
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?)
    }

    /// Commit on success, roll back on failure. Control returns only after
    /// the transaction has ended either way.
    async fn finish<T>(
        tx: Transaction<'static, Sqlite>,
        outcome: Result<T, StoreError>,
        what: &'static str,
    ) -> Result<T, StoreError> {
        match outcome {
            Ok(value) => {
                tx.commit()
                    .await
                    .with_context(|| format!("Failed to commit {what}"))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        error = %rollback_err,
                        operation = what,
                        "Failed to roll back transaction"
                    );
                }
                Err(err)
            }
        }
    }

    // ========================
    // Statements run inside a transaction
    // ========================

    /// Increment only if the result still fits an `i64`. SQLite would otherwise
    /// promote the sum to REAL and the row would no longer decode.
    async fn add_to_balance(
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Cents,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE balances SET balance = balance + ? WHERE user_id = ? AND balance <= ?",
        )
        .bind(amount)
        .bind(user_id)
        .bind(Cents::MAX.saturating_sub(amount))
        .execute(&mut *conn)
        .await
        .context("Failed to credit balance")?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        if Self::balance_exists(conn, user_id).await? {
            Err(StoreError::BalanceOverflow {
                user_id,
                requested: amount,
            })
        } else {
            Err(StoreError::NotFound(user_id))
        }
    }

    /// Decrement only if the balance covers `amount`. Zero rows affected means
    /// the user is missing or the funds are short; an existence check tells which.
    async fn take_from_balance(
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Cents,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE balances SET balance = balance - ? WHERE user_id = ? AND balance >= ?",
        )
        .bind(amount)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *conn)
        .await
        .context("Failed to debit balance")?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        if Self::balance_exists(conn, user_id).await? {
            Err(StoreError::InsufficientFunds {
                user_id,
                requested: amount,
            })
        } else {
            Err(StoreError::NotFound(user_id))
        }
    }

    async fn balance_exists(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM balances WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to check balance exists")?;
        Ok(row.is_some())
    }

    async fn append_operation(
        conn: &mut SqliteConnection,
        amount: Cents,
        kind: OperationKind,
        sender_id: Option<UserId>,
        recipient_id: Option<UserId>,
    ) -> Result<Operation, StoreError> {
        // Stored with microsecond precision; truncate so the returned record
        // matches what a later read yields.
        let created_at = Utc::now().trunc_subsecs(6);

        let row = sqlx::query(
            r#"
            INSERT INTO operations (amount, created_at, description, sender_id, recipient_id)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(amount)
        .bind(created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(kind.as_str())
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to append operation")?;

        Ok(Operation {
            id: row.get("id"),
            amount,
            created_at,
            description: kind.as_str().to_string(),
            sender_id,
            recipient_id,
        })
    }

    async fn apply_credit(
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Cents,
    ) -> Result<Operation, StoreError> {
        Self::add_to_balance(conn, user_id, amount).await?;
        Self::append_operation(conn, amount, OperationKind::Deposit, None, Some(user_id)).await
    }

    async fn apply_debit(
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Cents,
    ) -> Result<Operation, StoreError> {
        Self::take_from_balance(conn, user_id, amount).await?;
        Self::append_operation(conn, amount, OperationKind::Withdrawal, Some(user_id), None).await
    }

    async fn apply_transfer(
        conn: &mut SqliteConnection,
        sender_id: UserId,
        recipient_id: UserId,
        amount: Cents,
    ) -> Result<Operation, StoreError> {
        Self::take_from_balance(conn, sender_id, amount).await?;
        Self::add_to_balance(conn, recipient_id, amount).await?;
        Self::append_operation(
            conn,
            amount,
            OperationKind::Transfer,
            Some(sender_id),
            Some(recipient_id),
        )
        .await
    }

    async fn read_history(
        conn: &mut SqliteConnection,
        user_id: UserId,
        query: HistoryQuery,
    ) -> Result<OperationPage, StoreError> {
        // Column and direction come from closed enums, never from caller text.
        let sql = format!(
            r#"
            SELECT id, amount, created_at, description, sender_id, recipient_id
            FROM operations
            WHERE sender_id = ? OR recipient_id = ?
            ORDER BY {field} {dir}, id {dir}
            LIMIT ? OFFSET ?
            "#,
            field = query.sort_by.as_str(),
            dir = query.order.as_sql(),
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(user_id)
            .bind(i64::from(query.limit))
            .bind(query.offset())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list operations")?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM operations WHERE sender_id = ? OR recipient_id = ?",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to count operations")?
        .get("count");

        let operations = rows
            .iter()
            .map(Self::row_to_operation)
            .collect::<Result<Vec<_>>>()?;

        Ok(OperationPage { operations, total })
    }

    /// Replays the log per user in `i128`. Per-side sums can exceed `i64` even
    /// when every intermediate balance fits, so they are not left to SQLite.
    async fn audit_balances(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<BalanceDiscrepancy>, StoreError> {
        let balances = sqlx::query("SELECT user_id, balance FROM balances ORDER BY user_id")
            .fetch_all(&mut *conn)
            .await
            .context("Failed to read balances")?;

        let operations =
            sqlx::query("SELECT amount, sender_id, recipient_id FROM operations ORDER BY id")
                .fetch_all(&mut *conn)
                .await
                .context("Failed to read operations")?;

        let mut derived: HashMap<UserId, i128> = HashMap::new();
        for row in &operations {
            let amount: Cents = row.get("amount");
            let sender_id: Option<UserId> = row.get("sender_id");
            let recipient_id: Option<UserId> = row.get("recipient_id");

            if let Some(recipient_id) = recipient_id {
                *derived.entry(recipient_id).or_default() += i128::from(amount);
            }
            if let Some(sender_id) = sender_id {
                *derived.entry(sender_id).or_default() -= i128::from(amount);
            }
        }

        Ok(balances
            .iter()
            .filter_map(|row| {
                let user_id: UserId = row.get("user_id");
                let stored: Cents = row.get("balance");
                let replayed = derived.get(&user_id).copied().unwrap_or(0);
                (i128::from(stored) != replayed).then(|| BalanceDiscrepancy {
                    user_id,
                    stored,
                    // Out-of-range values are a mismatch either way
                    derived: Cents::try_from(replayed).unwrap_or(if replayed < 0 {
                        Cents::MIN
                    } else {
                        Cents::MAX
                    }),
                })
            })
            .collect())
    }

    fn row_to_operation(row: &SqliteRow) -> Result<Operation> {
        let created_at_str: String = row.get("created_at");

        Ok(Operation {
            id: row.get("id"),
            amount: row.get("amount"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
            description: row.get("description"),
            sender_id: row.get("sender_id"),
            recipient_id: row.get("recipient_id"),
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn create_balance(&self, user_id: UserId) -> Result<(), StoreError> {
        if self.ensure_balance(user_id).await? {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists(user_id))
        }
    }

    async fn ensure_balance(&self, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO balances (user_id, balance) VALUES (?, 0) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to create balance")?;

        let created = result.rows_affected() == 1;
        if created {
            tracing::debug!(user_id, "Opened balance");
        }
        Ok(created)
    }

    async fn credit(&self, user_id: UserId, amount: Cents) -> Result<Operation, StoreError> {
        let mut tx = self.begin().await?;
        let outcome = Self::apply_credit(&mut tx, user_id, amount).await;
        Self::finish(tx, outcome, "credit").await
    }

    async fn debit(&self, user_id: UserId, amount: Cents) -> Result<Operation, StoreError> {
        let mut tx = self.begin().await?;
        let outcome = Self::apply_debit(&mut tx, user_id, amount).await;
        Self::finish(tx, outcome, "debit").await
    }

    async fn transfer(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        amount: Cents,
    ) -> Result<Operation, StoreError> {
        let mut tx = self.begin().await?;
        let outcome = Self::apply_transfer(&mut tx, sender_id, recipient_id, amount).await;
        Self::finish(tx, outcome, "transfer").await
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Cents, StoreError> {
        let row = sqlx::query("SELECT balance FROM balances WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch balance")?;

        match row {
            Some(row) => Ok(row.try_get("balance").context("Invalid stored balance")?),
            None => Err(StoreError::NotFound(user_id)),
        }
    }

    async fn get_operation_history(
        &self,
        user_id: UserId,
        query: HistoryQuery,
    ) -> Result<OperationPage, StoreError> {
        // Page and total are read from the same snapshot.
        let mut tx = self.begin().await?;
        let outcome = Self::read_history(&mut tx, user_id, query).await;
        Self::finish(tx, outcome, "history read").await
    }

    async fn find_discrepancies(&self) -> Result<Vec<BalanceDiscrepancy>, StoreError> {
        // Balances and the log are read from the same snapshot.
        let mut tx = self.begin().await?;
        let outcome = Self::audit_balances(&mut tx).await;
        Self::finish(tx, outcome, "balance audit").await
    }
}
