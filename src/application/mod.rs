// Application layer - business rules on top of the ledger store.
// Validation, lazy account creation and currency presentation live here;
// the store stays a set of atomic primitives.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
