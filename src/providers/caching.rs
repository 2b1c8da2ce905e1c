use crate::core::cache::Cache;
use crate::core::currency::{CurrencyCode, HistoricalRateProvider};
use crate::core::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::debug;

type RateKey = (NaiveDate, CurrencyCode);

/// Memoizes historical rate lookups, failures included, for one run.
#[derive(Clone)]
pub struct CachingRateProvider<T: HistoricalRateProvider> {
    inner: T,
    cache: Cache<RateKey, Result<Decimal>>,
}

impl<T: HistoricalRateProvider> CachingRateProvider<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cache: Cache::new("historical-rates"),
        }
    }

    /// Fetches every pair not cached yet, concurrently.
    pub async fn warm(&self, pairs: &[RateKey]) {
        let mut missing = Vec::new();
        for pair in pairs {
            if !self.cache.contains(pair).await && !missing.contains(pair) {
                missing.push(pair.clone());
            }
        }
        debug!(
            requested = pairs.len(),
            missing = missing.len(),
            "Warming historical rate cache"
        );

        let lookups = missing.into_iter().map(|(date, currency)| async move {
            let result = self.inner.rate(date, &currency).await;
            self.cache.put((date, currency), result).await;
        });
        join_all(lookups).await;
    }
}

#[async_trait]
impl<T: HistoricalRateProvider> HistoricalRateProvider for CachingRateProvider<T> {
    async fn rate(&self, date: NaiveDate, currency: &CurrencyCode) -> Result<Decimal> {
        let key = (date, currency.clone());
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }
        let result = self.inner.rate(date, currency).await;
        self.cache.put(key, result.clone()).await;
        result
    }

    async fn prefetch(&self, pairs: &[(NaiveDate, CurrencyCode)]) {
        self.warm(pairs).await;
    }
}
