//! Tabular datasets produced by the pipeline.
//!
//! A [`Table`] is an ordered list of typed rows plus the ordered set of
//! currencies for which derived `<prefix>_<CURRENCY>` columns exist.

use crate::core::currency::CurrencyCode;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

/// A derived, currency-converted cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Cell {
    Value(Decimal),
    /// The source amount itself is absent (e.g. an operation without commission).
    Empty,
    /// The row's account has no rate for this column's currency.
    NotApplicable,
}

impl Cell {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Cell::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<Decimal>> for Cell {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(Cell::Empty, Cell::Value)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Value(v) => write!(f, "{}", v.normalize()),
            Cell::Empty => Ok(()),
            Cell::NotApplicable => f.write_str("N/A"),
        }
    }
}

/// A row type that can live in a [`Table`].
pub trait Record: Clone {
    /// Fixed columns, in output order, excluding `account`.
    const COLUMNS: &'static [&'static str];
    /// Prefixes of the per-currency columns, in output order.
    const DERIVED: &'static [&'static str] = &[];

    fn account(&self) -> Option<&str>;

    /// Text of a fixed column; `None` for unknown columns.
    fn field(&self, column: &str) -> Option<String>;

    fn derived(&self, _prefix: &str, _currency: &CurrencyCode) -> Option<&Cell> {
        None
    }

    /// Inserts [`Cell::NotApplicable`] for every currency the row has no cell for.
    fn fill_missing(&mut self, _currencies: &[CurrencyCode]) {}
}

/// Inserts the not-applicable marker for currencies absent from `cells`.
pub(crate) fn fill_not_applicable(
    cells: &mut BTreeMap<CurrencyCode, Cell>,
    currencies: &[CurrencyCode],
) {
    for currency in currencies {
        cells
            .entry(currency.clone())
            .or_insert(Cell::NotApplicable);
    }
}

pub(crate) fn opt_text<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table<R> {
    currencies: Vec<CurrencyCode>,
    tagged: bool,
    rows: Vec<R>,
}

impl<R: Record> Table<R> {
    pub fn new(rows: Vec<R>, currencies: Vec<CurrencyCode>, tagged: bool) -> Self {
        Self {
            currencies,
            tagged,
            rows,
        }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Currencies of the derived columns, in column order.
    pub fn currencies(&self) -> &[CurrencyCode] {
        &self.currencies
    }

    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = R::COLUMNS.iter().map(|c| c.to_string()).collect();
        if self.tagged {
            names.push("account".to_string());
        }
        for currency in &self.currencies {
            for prefix in R::DERIVED {
                names.push(format!("{prefix}_{currency}"));
            }
        }
        names
    }

    /// Text of any column of the row at `index`.
    pub fn text(&self, index: usize, column: &str) -> Option<String> {
        let row = self.rows.get(index)?;
        if column == "account" {
            return self.tagged.then(|| row.account().unwrap_or_default().to_string());
        }
        if let Some(text) = row.field(column) {
            return Some(text);
        }
        let (prefix, code) = column.rsplit_once('_')?;
        let currency = self.currencies.iter().find(|c| c.as_str() == code)?;
        if !R::DERIVED.contains(&prefix) {
            return None;
        }
        Some(
            row.derived(prefix, currency)
                .unwrap_or(&Cell::NotApplicable)
                .to_string(),
        )
    }

    /// Rows tagged with `account`, in their original order.
    pub fn for_account(&self, account: &str) -> Table<R> {
        let rows = self
            .rows
            .iter()
            .filter(|row| row.account() == Some(account))
            .cloned()
            .collect();
        Table::new(rows, self.currencies.clone(), self.tagged)
    }

    /// Stacks tables in the given order.
    ///
    /// Derived columns become the union of all inputs' currencies, in
    /// first-appearance order; rows lacking a currency get
    /// [`Cell::NotApplicable`]. No sorting or deduplication of rows.
    pub fn concat(tables: impl IntoIterator<Item = Table<R>>) -> Table<R> {
        let tables: Vec<Table<R>> = tables.into_iter().collect();

        let mut currencies: Vec<CurrencyCode> = Vec::new();
        for table in &tables {
            for currency in &table.currencies {
                if !currencies.contains(currency) {
                    currencies.push(currency.clone());
                }
            }
        }
        let tagged = !tables.is_empty() && tables.iter().all(|t| t.tagged);

        let mut rows = Vec::with_capacity(tables.iter().map(Table::len).sum());
        for table in tables {
            for mut row in table.rows {
                row.fill_missing(&currencies);
                rows.push(row);
            }
        }

        Table::new(rows, currencies, tagged)
    }
}
