//! Raw broker records and the closed enumerations decoded from them.

use crate::core::error::{PipelineError, Result};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Strips namespace qualifiers, e.g. `InstrumentType.Stock` -> `Stock`.
pub fn bare_name<'a>(field: &'static str, raw: &'a str) -> Result<&'a str> {
    let bare = raw.rsplit('.').next().unwrap_or(raw).trim();
    if bare.is_empty() {
        return Err(PipelineError::malformed(field, raw));
    }
    Ok(bare)
}

/// Declares a closed enum whose variants decode from (optionally qualified)
/// bare names and display back as the same bare name.
macro_rules! symbolic_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = PipelineError;

            fn from_str(s: &str) -> Result<Self> {
                let bare = bare_name($field, s)?;
                $(
                    if bare == stringify!($variant) {
                        return Ok($name::$variant);
                    }
                )+
                Err(PipelineError::malformed($field, s))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

symbolic_enum!(
    /// Kind of instrument held or traded.
    InstrumentKind, "instrument_type" {
        Stock,
        Currency,
        Bond,
        Etf,
    }
);

symbolic_enum!(
    /// Kind of a recorded account operation.
    OperationKind, "operation_type" {
        Buy,
        BuyCard,
        Sell,
        BrokerCommission,
        ExchangeCommission,
        ServiceCommission,
        MarginCommission,
        OtherCommission,
        PayIn,
        PayOut,
        Tax,
        TaxLucre,
        TaxDividend,
        TaxCoupon,
        TaxBack,
        Repayment,
        PartRepayment,
        Coupon,
        Dividend,
        SecurityIn,
        SecurityOut,
    }
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyAmount {
    pub currency: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub figi: String,
    #[serde(default)]
    pub ticker: Option<String>,
    pub name: String,
    #[serde(default)]
    pub average_position_price: Option<MoneyAmount>,
    #[serde(default)]
    pub expected_yield: Option<MoneyAmount>,
    pub balance: Decimal,
    pub instrument_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    pub id: String,
    #[serde(default)]
    pub figi: Option<String>,
    pub date: DateTime<FixedOffset>,
    pub payment: Decimal,
    #[serde(default)]
    pub commission: Option<MoneyAmount>,
    pub currency: String,
    #[serde(default)]
    pub quantity_executed: Option<Decimal>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    pub operation_type: String,
}

/// Everything the broker supplies for one account in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAccount {
    pub positions: Vec<RawPosition>,
    pub operations: Vec<RawOperation>,
    /// Current quotes: currency code -> rate to the base currency.
    pub rates: BTreeMap<String, Decimal>,
}
