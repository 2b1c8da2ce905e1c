//! Turns one account's raw broker records into tagged tables.

use crate::core::currency::CurrencyCode;
use crate::core::error::{PipelineError, Result};
use crate::core::records::{InstrumentKind, OperationKind, RawOperation, RawPosition};
use crate::core::table::{Record, Table, opt_text};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub figi: String,
    pub ticker: Option<String>,
    pub name: String,
    /// Average cost of one unit.
    pub cost: Decimal,
    /// Unrealized yield of the whole position.
    #[serde(rename = "yield")]
    pub expected_yield: Decimal,
    /// `cost * balance + yield`, in `currency`.
    pub value: Decimal,
    pub currency: CurrencyCode,
    pub balance: Decimal,
    pub instrument: InstrumentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRow {
    pub id: String,
    pub figi: Option<String>,
    pub date: NaiveDate,
    pub payment: Decimal,
    pub commission: Option<Decimal>,
    pub currency: CurrencyCode,
    pub quantity: Option<Decimal>,
    pub instrument: Option<InstrumentKind>,
    pub operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub currency: CurrencyCode,
    pub exchange_rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl Record for PositionRow {
    const COLUMNS: &'static [&'static str] = &[
        "figi",
        "ticker",
        "name",
        "cost",
        "yield",
        "value",
        "currency",
        "balance",
        "instrument",
    ];

    fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    fn field(&self, column: &str) -> Option<String> {
        let text = match column {
            "figi" => self.figi.clone(),
            "ticker" => opt_text(&self.ticker),
            "name" => self.name.clone(),
            "cost" => self.cost.to_string(),
            "yield" => self.expected_yield.to_string(),
            "value" => self.value.to_string(),
            "currency" => self.currency.to_string(),
            "balance" => self.balance.to_string(),
            "instrument" => self.instrument.to_string(),
            _ => return None,
        };
        Some(text)
    }
}

impl Record for OperationRow {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "figi",
        "date",
        "payment",
        "commission",
        "currency",
        "quantity",
        "instrument",
        "operation",
    ];

    fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    fn field(&self, column: &str) -> Option<String> {
        let text = match column {
            "id" => self.id.clone(),
            "figi" => opt_text(&self.figi),
            "date" => self.date.to_string(),
            "payment" => self.payment.to_string(),
            "commission" => opt_text(&self.commission),
            "currency" => self.currency.to_string(),
            "quantity" => opt_text(&self.quantity),
            "instrument" => opt_text(&self.instrument),
            "operation" => self.operation.to_string(),
            _ => return None,
        };
        Some(text)
    }
}

impl Record for RateRow {
    const COLUMNS: &'static [&'static str] = &["currency", "exchange_rate"];

    fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    fn field(&self, column: &str) -> Option<String> {
        match column {
            "currency" => Some(self.currency.to_string()),
            "exchange_rate" => Some(self.exchange_rate.to_string()),
            _ => None,
        }
    }
}

/// The three tables of one account before currency conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAccount {
    pub positions: Table<PositionRow>,
    pub operations: Table<OperationRow>,
    pub rates: Table<RateRow>,
}

impl RateRow {
    /// Rate snapshot as a lookup map.
    pub fn snapshot(rates: &Table<RateRow>) -> BTreeMap<CurrencyCode, Decimal> {
        rates
            .rows()
            .iter()
            .map(|r| (r.currency.clone(), r.exchange_rate))
            .collect()
    }
}

pub fn normalize_position(raw: &RawPosition, account: Option<&str>) -> Result<PositionRow> {
    let currency_source = raw
        .expected_yield
        .as_ref()
        .or(raw.average_position_price.as_ref())
        .ok_or_else(|| PipelineError::malformed("currency", ""))?;
    let currency: CurrencyCode = currency_source.currency.parse()?;

    let cost = raw
        .average_position_price
        .as_ref()
        .map_or(Decimal::ZERO, |p| p.value);
    let expected_yield = raw.expected_yield.as_ref().map_or(Decimal::ZERO, |y| y.value);

    Ok(PositionRow {
        figi: raw.figi.clone(),
        ticker: raw.ticker.clone(),
        name: raw.name.clone(),
        cost,
        expected_yield,
        value: cost * raw.balance + expected_yield,
        currency,
        balance: raw.balance,
        instrument: raw.instrument_type.parse()?,
        account: account.map(str::to_string),
    })
}

pub fn normalize_operation(raw: &RawOperation, account: Option<&str>) -> Result<OperationRow> {
    let instrument = raw
        .instrument_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()?;

    Ok(OperationRow {
        id: raw.id.clone(),
        figi: raw.figi.clone(),
        date: raw.date.date_naive(),
        payment: raw.payment,
        commission: raw.commission.as_ref().map(|c| c.value),
        currency: raw.currency.parse()?,
        quantity: raw.quantity_executed,
        instrument,
        operation: raw.operation_type.parse()?,
        account: account.map(str::to_string),
    })
}

/// Builds the positions, operations and rate tables for one account.
///
/// Rows keep the order of the raw lists. With `account == None` the tables
/// carry no `account` column at all.
pub fn normalize_account(
    positions: &[RawPosition],
    operations: &[RawOperation],
    rates: &BTreeMap<String, Decimal>,
    account: Option<&str>,
) -> Result<NormalizedAccount> {
    let tagged = account.is_some();

    let position_rows = positions
        .iter()
        .map(|p| normalize_position(p, account))
        .collect::<Result<Vec<_>>>()?;

    let operation_rows = operations
        .iter()
        .map(|o| normalize_operation(o, account))
        .collect::<Result<Vec<_>>>()?;

    let rate_rows = rates
        .iter()
        .map(|(currency, rate)| {
            Ok(RateRow {
                currency: currency.parse()?,
                exchange_rate: *rate,
                account: account.map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        account = account.unwrap_or("-"),
        positions = position_rows.len(),
        operations = operation_rows.len(),
        rates = rate_rows.len(),
        "Normalized account records"
    );

    Ok(NormalizedAccount {
        positions: Table::new(position_rows, Vec::new(), tagged),
        operations: Table::new(operation_rows, Vec::new(), tagged),
        rates: Table::new(rate_rows, Vec::new(), tagged),
    })
}
