use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::Cents;

use super::{ConversionError, CurrencyConverter};

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    result: Option<f64>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for an exchangerates-style rate service
/// (`GET {base_url}/convert?from=..&to=..&amount=..`, key in the `apikey` header).
#[derive(Debug, Clone)]
pub struct ExchangeRatesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ExchangeRatesClient {
    /// Create a new client.
    ///
    /// * `base_url` - service root, e.g. `"https://api.apilayer.com/exchangerates_data"`
    /// * `api_key` - key sent with every request
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConversionError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CurrencyConverter for ExchangeRatesClient {
    async fn convert(
        &self,
        amount: Cents,
        base_currency: &str,
        target_currency: &str,
    ) -> Result<f64, ConversionError> {
        let url = format!("{}/convert", self.base_url);
        let amount = amount.to_string();

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .query(&[
                ("from", base_currency),
                ("to", target_currency),
                ("amount", amount.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ConversionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ConvertResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(ConversionError::Api {
                status: status.as_u16(),
                message: error
                    .message
                    .or(error.code)
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let result = body.result.ok_or(ConversionError::MissingResult)?;
        tracing::debug!(
            from = base_currency,
            to = target_currency,
            result,
            "Converted balance"
        );
        Ok(result)
    }
}
