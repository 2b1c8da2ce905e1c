//! Errors raised while normalizing and converting account data.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A symbolic field could not be reduced to a known bare name.
    #[error("Malformed {field} value: '{value}'")]
    MalformedEnumValue { field: &'static str, value: String },

    /// No historical rate is published for the requested pair.
    #[error("No exchange rate published for {currency} on {date}")]
    RateUnavailable { date: NaiveDate, currency: String },

    #[error(
        "Names, ids and starting dates must have equal length (got {names}, {ids}, {dates})"
    )]
    MismatchedInputLengths {
        names: usize,
        ids: usize,
        dates: usize,
    },

    #[error("Invalid exchange rate {rate} for {currency}")]
    InvalidRate { currency: String, rate: Decimal },

    #[error("Broker request to {endpoint} failed: {message}")]
    Response { endpoint: String, message: String },

    #[error("Account '{account}' failed: {source}")]
    Account {
        account: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        PipelineError::MalformedEnumValue {
            field,
            value: value.into(),
        }
    }

    /// Wraps this error with the tag of the account being processed.
    pub fn in_account(self, account: impl Into<String>) -> Self {
        PipelineError::Account {
            account: account.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any account wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Account { source, .. } => source.root(),
            other => other,
        }
    }

    /// Tag of the outermost account this error was raised for, if any.
    pub fn account(&self) -> Option<&str> {
        match self {
            PipelineError::Account { account, .. } => Some(account),
            _ => None,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_account_context() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let err = PipelineError::RateUnavailable {
            date,
            currency: "EUR".to_string(),
        }
        .in_account("Main");

        assert_eq!(err.account(), Some("Main"));
        assert_eq!(
            err.root(),
            &PipelineError::RateUnavailable {
                date,
                currency: "EUR".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "Account 'Main' failed: No exchange rate published for EUR on 2021-03-01"
        );
    }

    #[test]
    fn test_malformed_message() {
        let err = PipelineError::malformed("instrument_type", "InstrumentType.");
        assert_eq!(
            err.to_string(),
            "Malformed instrument_type value: 'InstrumentType.'"
        );
        assert!(err.account().is_none());
    }
}
