use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, UserId};

pub type OperationId = i64;

/// What a committed operation did to the balances it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Money entered an account from outside the ledger
    Deposit,
    /// Money left an account to outside the ledger
    Withdrawal,
    /// Money moved between two accounts
    Transfer,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdrawal => "withdrawal",
            OperationKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(OperationKind::Deposit),
            "withdrawal" => Some(OperationKind::Withdrawal),
            "transfer" => Some(OperationKind::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable audit record of one committed balance mutation.
///
/// A deposit names only the recipient, a withdrawal only the sender, and a
/// transfer both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Assigned by the store, monotonically increasing
    pub id: OperationId,
    /// Magnitude of the movement (always positive)
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
    /// Human-readable label of the operation kind
    pub description: String,
    /// Account money left, if any
    pub sender_id: Option<UserId>,
    /// Account money entered, if any
    pub recipient_id: Option<UserId>,
}

impl Operation {
    /// The kind implied by which parties are set.
    pub fn kind(&self) -> Option<OperationKind> {
        match (self.sender_id, self.recipient_id) {
            (None, Some(_)) => Some(OperationKind::Deposit),
            (Some(_), None) => Some(OperationKind::Withdrawal),
            (Some(_), Some(_)) => Some(OperationKind::Transfer),
            (None, None) => None,
        }
    }

    /// Signed effect of this operation on `user_id`'s balance.
    pub fn delta_for(&self, user_id: UserId) -> Cents {
        let incoming = if self.recipient_id == Some(user_id) {
            self.amount
        } else {
            0
        };
        let outgoing = if self.sender_id == Some(user_id) {
            self.amount
        } else {
            0
        };
        incoming - outgoing
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.sender_id == Some(user_id) || self.recipient_id == Some(user_id)
    }
}

/// Column an operation history page is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Amount,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Amount => "amount",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created_at" | "date" => Some(SortField::CreatedAt),
            "amount" => Some(SortField::Amount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Paging and ordering for an operation history request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: u32,
    pub page: u32,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn sorted_by(mut self, sort_by: SortField, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }

    /// Rows to skip before this page starts.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            page: 1,
            sort_by: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

/// One page of a user's operations plus the total number of matching records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPage {
    pub operations: Vec<Operation>,
    pub total: i64,
}
