use thiserror::Error;

use crate::domain::{Cents, UserId};

/// Failures of the ledger store, classified at the point they occur.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no balance for user {0}")]
    NotFound(UserId),

    #[error("balance already exists for user {0}")]
    AlreadyExists(UserId),

    #[error("insufficient funds for user {user_id}: requested {requested}")]
    InsufficientFunds { user_id: UserId, requested: Cents },

    #[error("balance of user {user_id} cannot hold {requested} more")]
    BalanceOverflow { user_id: UserId, requested: Cents },

    #[error("database failure: {0:#}")]
    Database(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
