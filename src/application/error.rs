use thiserror::Error;

use crate::domain::{Cents, UserId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("balance not found for user {0}")]
    NotFound(UserId),

    #[error("balance already exists for user {0}")]
    AlreadyExists(UserId),

    #[error("wrong input: {0}")]
    WrongInput(String),

    #[error("insufficient funds for user {user_id}: requested {requested}")]
    InsufficientFunds { user_id: UserId, requested: Cents },

    /// The cause is kept for logs only and never shown to callers.
    #[error("internal error")]
    Database(#[source] anyhow::Error),

    /// Setting up a collaborator (e.g. the rate service client) failed.
    #[error("internal error")]
    Configuration(#[source] anyhow::Error),
}

/// Coarse classification for reporting an [`AppError`] to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    WrongInput,
    InsufficientFunds,
    Internal,
}

impl AppError {
    pub fn wrong_input(message: impl Into<String>) -> Self {
        AppError::WrongInput(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            AppError::WrongInput(_) => ErrorKind::WrongInput,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::Database(_) | AppError::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// True when the caller can fix the request; false for internal failures.
    pub fn is_client_error(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(user_id) => AppError::NotFound(user_id),
            StoreError::AlreadyExists(user_id) => AppError::AlreadyExists(user_id),
            StoreError::InsufficientFunds { user_id, requested } => {
                AppError::InsufficientFunds { user_id, requested }
            }
            StoreError::BalanceOverflow { user_id, requested } => AppError::wrong_input(format!(
                "balance of user {user_id} cannot hold {requested} more"
            )),
            StoreError::Database(cause) => AppError::Database(cause),
        }
    }
}
