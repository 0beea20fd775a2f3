//! Currency presentation.
//!
//! Balances are stored in a single base currency. Conversion happens only when a
//! balance is displayed and never touches the ledger.

mod exchange_rates;

use async_trait::async_trait;
use thiserror::Error;

pub use exchange_rates::*;

use crate::domain::Cents;

/// Errors from a conversion provider.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate service error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("rate service returned no result")]
    MissingResult,

    #[error("currency conversion is not configured")]
    NotConfigured,
}

/// Converts an amount between currencies.
///
/// Conversion is linear, so an amount in minor units converts to minor units
/// of the target currency.
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    async fn convert(
        &self,
        amount: Cents,
        base_currency: &str,
        target_currency: &str,
    ) -> Result<f64, ConversionError>;
}

/// Converter used when no rate service is configured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledConverter;

#[async_trait]
impl CurrencyConverter for DisabledConverter {
    async fn convert(
        &self,
        _amount: Cents,
        _base_currency: &str,
        _target_currency: &str,
    ) -> Result<f64, ConversionError> {
        Err(ConversionError::NotConfigured)
    }
}
