use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::core::broker::BrokerClient;
use crate::core::currency::CurrencyCode;
use crate::core::error::{PipelineError, Result};
use crate::core::records::{RawOperation, RawPosition};

pub const DEFAULT_BASE_URL: &str = "https://api-invest.tinkoff.ru/openapi";

/// FIGIs of the currencies quoted in the rate snapshot (USD, EUR).
pub const BASIC_CURRENCY_FIGIS: [&str; 2] = ["BBG0013HGFT4", "BBG0013HJJ31"];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    payload: T,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortfolioPayload {
    positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct OperationsPayload {
    operations: Vec<RawOperation>,
}

#[derive(Debug, Deserialize)]
struct InstrumentPayload {
    ticker: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderbookPayload {
    last_price: Option<Decimal>,
}

/// Currency the order books quote in.
const QUOTED_IN: &str = "RUB";

/// REST client for the broker's OpenAPI.
pub struct TinkoffClient {
    base_url: String,
    token: String,
    currency_figis: Vec<String>,
    base: CurrencyCode,
}

impl TinkoffClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        TinkoffClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            currency_figis: BASIC_CURRENCY_FIGIS.iter().map(|f| f.to_string()).collect(),
            base: CurrencyCode::rub(),
        }
    }

    /// Expresses the current quotes in `base` units instead of rubles.
    pub fn with_base(mut self, base: CurrencyCode) -> Self {
        self.base = base;
        self
    }

    pub fn with_currency_figis(mut self, figis: Vec<String>) -> Self {
        self.currency_figis = figis;
        self
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let failure = |message: String| PipelineError::Response {
            endpoint: endpoint.to_string(),
            message,
        };

        let url = reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, endpoint), query)
            .map_err(|e| failure(format!("Invalid URL: {e}")))?;
        debug!("Requesting {}", url.path());

        let client = reqwest::Client::builder()
            .user_agent("investboard/0.1")
            .build()
            .map_err(|e| failure(e.to_string()))?;
        let response = client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| failure(format!("Request error: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| failure(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Envelope<ErrorPayload>>(&text)
                .ok()
                .and_then(|e| match (e.payload.code, e.payload.message) {
                    (Some(code), Some(message)) => Some(format!("{code}: {message}")),
                    (None, Some(message)) => Some(message),
                    (Some(code), None) => Some(code),
                    (None, None) => None,
                })
                .unwrap_or_else(|| format!("HTTP error: {status}"));
            return Err(failure(detail));
        }

        serde_json::from_str::<Envelope<T>>(&text)
            .map(|envelope| envelope.payload)
            .map_err(|e| failure(format!("Failed to parse JSON response: {e}")))
    }
}

#[async_trait]
impl BrokerClient for TinkoffClient {
    #[instrument(name = "TinkoffPortfolio", skip(self))]
    async fn portfolio(&self, account_id: &str) -> Result<Vec<RawPosition>> {
        let payload: PortfolioPayload = self
            .get("/portfolio", &[("brokerAccountId", account_id.to_string())])
            .await?;
        Ok(payload.positions)
    }

    #[instrument(name = "TinkoffOperations", skip(self))]
    async fn operations(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawOperation>> {
        let payload: OperationsPayload = self
            .get(
                "/operations",
                &[
                    ("from", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("to", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ("brokerAccountId", account_id.to_string()),
                ],
            )
            .await?;
        Ok(payload.operations)
    }

    async fn exchange_rates(&self) -> Result<BTreeMap<String, Decimal>> {
        let mut rates = BTreeMap::new();
        for figi in &self.currency_figis {
            let instrument: InstrumentPayload = self
                .get("/market/search/by-figi", &[("figi", figi.clone())])
                .await?;
            let ticker: String = instrument.ticker.chars().take(3).collect();

            let orderbook: OrderbookPayload = self
                .get(
                    "/market/orderbook",
                    &[("figi", figi.clone()), ("depth", "1".to_string())],
                )
                .await?;
            let price = orderbook.last_price.ok_or_else(|| PipelineError::Response {
                endpoint: "/market/orderbook".to_string(),
                message: format!("No last price for {figi}"),
            })?;

            debug!(%ticker, %price, "Current exchange rate");
            rates.insert(ticker, price);
        }
        rebase(rates, &self.base)
    }
}

/// Re-expresses ruble quotes per unit of `base`. The base itself is dropped
/// and rubles get an explicit entry.
fn rebase(
    mut rates: BTreeMap<String, Decimal>,
    base: &CurrencyCode,
) -> Result<BTreeMap<String, Decimal>> {
    if base.as_str() == QUOTED_IN {
        return Ok(rates);
    }
    let base_rubles = rates
        .remove(base.as_str())
        .filter(|r| !r.is_zero())
        .ok_or_else(|| PipelineError::Response {
            endpoint: "/market/orderbook".to_string(),
            message: format!("No quote for base currency {base}"),
        })?;

    for rate in rates.values_mut() {
        *rate /= base_rubles;
    }
    rates.insert(QUOTED_IN.to_string(), Decimal::ONE / base_rubles);
    Ok(rates)
}
