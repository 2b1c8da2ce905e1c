//! Central Bank of Russia official daily rates, read from the JSON archive
//! mirror (`/archive/YYYY/MM/DD/daily_json.js`).

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::core::cache::Cache;
use crate::core::currency::{CurrencyCode, HistoricalRateProvider};
use crate::core::error::{PipelineError, Result as PipelineResult};

pub const DEFAULT_BASE_URL: &str = "https://www.cbr-xml-daily.ru";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Currency all published rates are quoted in.
const PUBLISHED_IN: &str = "RUB";

/// Rates of one publication day: currency code -> rubles per unit.
pub type DailyRates = Arc<HashMap<String, Decimal>>;

/// Fetched at most once per day; `None` marks a day without publication.
pub type DayCell = Arc<OnceCell<Option<DailyRates>>>;

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Valute")]
    valute: HashMap<String, Valute>,
}

#[derive(Debug, Deserialize)]
struct Valute {
    #[serde(rename = "Nominal")]
    nominal: u32,
    #[serde(rename = "Value")]
    value: Decimal,
}

pub struct CbrRateProvider {
    base_url: String,
    lookback_days: u32,
    base: CurrencyCode,
    cache: Arc<Cache<NaiveDate, DayCell>>,
}

impl CbrRateProvider {
    pub fn new(base_url: &str, lookback_days: u32, cache: Arc<Cache<NaiveDate, DayCell>>) -> Self {
        CbrRateProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            lookback_days,
            base: CurrencyCode::rub(),
            cache,
        }
    }

    /// Quotes rates in `base` units instead of rubles.
    pub fn with_base(mut self, base: CurrencyCode) -> Self {
        self.base = base;
        self
    }

    /// Rates published for exactly `day`, or `None` when nothing was published.
    ///
    /// Concurrent callers for the same day wait on a single request.
    async fn daily(&self, day: NaiveDate) -> Result<Option<DailyRates>> {
        let cell = self
            .cache
            .get_or_insert_with(day, || Arc::new(OnceCell::new()))
            .await;
        cell.get_or_try_init(|| self.fetch_daily(day))
            .await
            .cloned()
    }

    async fn fetch_daily(&self, day: NaiveDate) -> Result<Option<DailyRates>> {
        let url = format!(
            "{}/archive/{}/daily_json.js",
            self.base_url,
            day.format("%Y/%m/%d")
        );
        debug!("Requesting daily rates from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("investboard/0.1")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for {}", e, url))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%day, "No rates published");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for {}", response.status(), url));
        }

        let text = response.text().await?;
        let data: DailyResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse daily rates for {}: {}", day, e))?;

        let mut rates = HashMap::with_capacity(data.valute.len() + 1);
        for (code, valute) in data.valute {
            if valute.nominal == 0 {
                warn!(%day, %code, "Skipping rate with zero nominal");
                continue;
            }
            rates.insert(code, valute.value / Decimal::from(valute.nominal));
        }
        rates.insert(PUBLISHED_IN.to_string(), Decimal::ONE);

        Ok(Some(Arc::new(rates)))
    }
}

#[async_trait]
impl HistoricalRateProvider for CbrRateProvider {
    #[instrument(name = "CbrRateFetch", skip(self), fields(date = %date, currency = %currency))]
    async fn rate(&self, date: NaiveDate, currency: &CurrencyCode) -> PipelineResult<Decimal> {
        let unavailable = |code: &CurrencyCode| PipelineError::RateUnavailable {
            date,
            currency: code.to_string(),
        };

        for offset in 0..=self.lookback_days {
            let day = date - Duration::days(i64::from(offset));
            match self.daily(day).await {
                Ok(Some(rates)) => {
                    let rubles = rates
                        .get(currency.as_str())
                        .copied()
                        .ok_or_else(|| unavailable(currency))?;
                    let base_rubles = rates
                        .get(self.base.as_str())
                        .copied()
                        .filter(|r| !r.is_zero())
                        .ok_or_else(|| unavailable(&self.base))?;
                    return Ok(rubles / base_rubles);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, %day, "Daily rate request failed");
                    return Err(unavailable(currency));
                }
            }
        }

        debug!(lookback = self.lookback_days, "No publication within lookback window");
        Err(unavailable(currency))
    }
}
