use serde::{Deserialize, Serialize};

use super::Cents;

/// Identifier of the user owning a balance. One balance row per user.
pub type UserId = i64;

/// A balance as presented to a caller, possibly converted to a display currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    pub user_id: UserId,
    pub amount: f64,
    /// Currency code the amount is expressed in.
    pub currency: String,
}

/// A balance that disagrees with the operations recorded against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDiscrepancy {
    pub user_id: UserId,
    /// Value in the balances table
    pub stored: Cents,
    /// Incoming minus outgoing operation amounts
    pub derived: Cents,
}
