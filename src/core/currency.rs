//! Currency codes and exchange rate abstractions

use crate::core::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// An ISO-style three letter currency code, always upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Russian ruble, the default base currency.
    pub fn rub() -> Self {
        CurrencyCode("RUB".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = PipelineError;

    /// Accepts both bare codes ("USD") and qualified names ("Currency.USD").
    fn from_str(s: &str) -> Result<Self> {
        let bare = crate::core::records::bare_name("currency", s)?;
        if bare.len() != 3 || !bare.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PipelineError::malformed("currency", s));
        }
        Ok(CurrencyCode(bare.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for CurrencyCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Resolves the rate in effect on a past date, expressed in base currency
/// units per one unit of `currency`.
///
/// Implementations must either return a rate or fail with
/// [`PipelineError::RateUnavailable`]; callers never ask for the base
/// currency itself.
#[async_trait]
pub trait HistoricalRateProvider: Send + Sync {
    async fn rate(&self, date: NaiveDate, currency: &CurrencyCode) -> Result<Decimal>;

    /// Hint that all of `pairs` are about to be requested.
    async fn prefetch(&self, _pairs: &[(NaiveDate, CurrencyCode)]) {}
}

/// Rejects rates that cannot be divided by.
pub fn ensure_positive(currency: &CurrencyCode, rate: Decimal) -> Result<Decimal> {
    if rate > Decimal::ZERO {
        Ok(rate)
    } else {
        Err(PipelineError::InvalidRate {
            currency: currency.to_string(),
            rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_code_parsing() {
        assert_eq!("USD".parse::<CurrencyCode>().unwrap(), "USD");
        assert_eq!("Currency.EUR".parse::<CurrencyCode>().unwrap(), "EUR");
        assert_eq!("rub".parse::<CurrencyCode>().unwrap(), "RUB");

        assert!(matches!(
            "US".parse::<CurrencyCode>(),
            Err(PipelineError::MalformedEnumValue { field: "currency", .. })
        ));
        assert!("Currency.".parse::<CurrencyCode>().is_err());
        assert!("U$D".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_currency_code_serde() {
        let code: CurrencyCode = serde_json::from_str("\"usd\"").unwrap();
        assert_eq!(code.as_str(), "USD");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"USD\"");
        assert!(serde_json::from_str::<CurrencyCode>("\"DOLLARS\"").is_err());
    }

    #[test]
    fn test_ensure_positive() {
        let usd: CurrencyCode = "USD".parse().unwrap();
        assert_eq!(ensure_positive(&usd, dec!(90.5)).unwrap(), dec!(90.5));
        assert_eq!(
            ensure_positive(&usd, Decimal::ZERO),
            Err(PipelineError::InvalidRate {
                currency: "USD".to_string(),
                rate: Decimal::ZERO
            })
        );
    }
}
