pub mod application;
pub mod cli;
pub mod config;
pub mod currency;
pub mod domain;
pub mod storage;
pub mod telemetry;

pub use application::{AccountService, AppError, ErrorKind};
pub use config::Config;
pub use domain::*;
pub use storage::{LedgerStore, SqliteLedger, StoreError};
