//! Currency equivalence: expresses every position and operation in the
//! base currency and in every currency of the account's rate snapshot.

use crate::core::currency::{CurrencyCode, HistoricalRateProvider, ensure_positive};
use crate::core::error::Result;
use crate::core::normalize::{NormalizedAccount, OperationRow, PositionRow, RateRow};
use crate::core::table::{Cell, Record, Table, fill_not_applicable};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// Where a position's rate to the base currency came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RateSource {
    /// The position is in the base currency.
    Base,
    /// Explicit entry of the rate snapshot.
    Snapshot,
    /// No snapshot entry; 1.0 assumed as if it were base currency.
    Defaulted,
}

impl std::fmt::Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RateSource::Base => "base",
            RateSource::Snapshot => "snapshot",
            RateSource::Defaulted => "defaulted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuedPosition {
    #[serde(flatten)]
    pub position: PositionRow,
    pub rate_source: RateSource,
    /// `value_<CUR>` cells, including the base currency.
    pub values: BTreeMap<CurrencyCode, Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuedOperation {
    #[serde(flatten)]
    pub operation: OperationRow,
    /// `payment_<CUR>` cells, including the base currency.
    pub payments: BTreeMap<CurrencyCode, Cell>,
    /// `commission_<CUR>` cells, including the base currency.
    pub commissions: BTreeMap<CurrencyCode, Cell>,
}

impl Record for ValuedPosition {
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
        "rate_source",
    ];
    const DERIVED: &'static [&'static str] = &["value"];

    fn account(&self) -> Option<&str> {
        self.position.account()
    }

    fn field(&self, column: &str) -> Option<String> {
        if column == "rate_source" {
            return Some(self.rate_source.to_string());
        }
        self.position.field(column)
    }

    fn derived(&self, prefix: &str, currency: &CurrencyCode) -> Option<&Cell> {
        match prefix {
            "value" => self.values.get(currency),
            _ => None,
        }
    }

    fn fill_missing(&mut self, currencies: &[CurrencyCode]) {
        fill_not_applicable(&mut self.values, currencies);
    }
}

impl Record for ValuedOperation {
    const COLUMNS: &'static [&'static str] = OperationRow::COLUMNS;
    const DERIVED: &'static [&'static str] = &["payment", "commission"];

    fn account(&self) -> Option<&str> {
        self.operation.account()
    }

    fn field(&self, column: &str) -> Option<String> {
        self.operation.field(column)
    }

    fn derived(&self, prefix: &str, currency: &CurrencyCode) -> Option<&Cell> {
        match prefix {
            "payment" => self.payments.get(currency),
            "commission" => self.commissions.get(currency),
            _ => None,
        }
    }

    fn fill_missing(&mut self, currencies: &[CurrencyCode]) {
        fill_not_applicable(&mut self.payments, currencies);
        fill_not_applicable(&mut self.commissions, currencies);
    }
}

/// One account's tables after currency conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuedAccount {
    pub positions: Table<ValuedPosition>,
    pub operations: Table<ValuedOperation>,
    pub rates: Table<RateRow>,
}

/// Snapshot currencies other than the base one, in snapshot order.
fn target_currencies(rates: &Table<RateRow>, base: &CurrencyCode) -> Vec<CurrencyCode> {
    rates
        .rows()
        .iter()
        .map(|r| r.currency.clone())
        .filter(|c| c != base)
        .collect()
}

/// Derived column currencies: base first, then the snapshot's.
fn column_currencies(base: &CurrencyCode, targets: &[CurrencyCode]) -> Vec<CurrencyCode> {
    std::iter::once(base.clone())
        .chain(targets.iter().cloned())
        .collect()
}

/// Resolves a position's rate to base from the current-quote snapshot.
///
/// Currencies without a snapshot entry are treated as base currency. That
/// is only right for the base currency itself, so any other currency
/// falling through is reported as [`RateSource::Defaulted`].
fn snapshot_rate(
    snapshot: &BTreeMap<CurrencyCode, Decimal>,
    position: &PositionRow,
    base: &CurrencyCode,
) -> (Decimal, RateSource) {
    if let Some(rate) = snapshot.get(&position.currency) {
        return (*rate, RateSource::Snapshot);
    }
    if &position.currency == base {
        return (Decimal::ONE, RateSource::Base);
    }
    warn!(
        account = position.account.as_deref().unwrap_or("-"),
        figi = %position.figi,
        currency = %position.currency,
        "No current rate for position currency, assuming 1.0"
    );
    (Decimal::ONE, RateSource::Defaulted)
}

/// Adds `value_<BASE>` and `value_<X>` for every snapshot currency `X`.
///
/// Positions already in the base currency copy `value_<BASE>` into every
/// `value_<X>` column instead of dividing by the rate of `X`.
pub fn value_positions(
    positions: &Table<PositionRow>,
    rates: &Table<RateRow>,
    base: &CurrencyCode,
) -> Result<Table<ValuedPosition>> {
    let snapshot = RateRow::snapshot(rates);
    let targets = target_currencies(rates, base);

    let mut valued = Vec::with_capacity(positions.len());
    for position in positions.rows() {
        let (rate, rate_source) = snapshot_rate(&snapshot, position, base);
        let value_base = position.value * rate;

        let mut values = BTreeMap::new();
        values.insert(base.clone(), Cell::Value(value_base));
        for target in &targets {
            let value = if &position.currency == base {
                value_base
            } else {
                value_base / ensure_positive(target, snapshot[target])?
            };
            values.insert(target.clone(), Cell::Value(value));
        }

        valued.push(ValuedPosition {
            position: position.clone(),
            rate_source,
            values,
        });
    }

    Ok(Table::new(
        valued,
        column_currencies(base, &targets),
        positions.is_tagged(),
    ))
}

/// Distinct `(date, currency)` lookups needed to convert `operations`.
pub fn required_lookups(
    operations: &Table<OperationRow>,
    targets: &[CurrencyCode],
    base: &CurrencyCode,
) -> Vec<(NaiveDate, CurrencyCode)> {
    let mut pairs = BTreeSet::new();
    for op in operations.rows() {
        if &op.currency != base {
            pairs.insert((op.date, op.currency.clone()));
        }
        for target in targets {
            if target != &op.currency {
                pairs.insert((op.date, target.clone()));
            }
        }
    }
    pairs.into_iter().collect()
}

async fn historical_rate(
    provider: &dyn HistoricalRateProvider,
    date: NaiveDate,
    currency: &CurrencyCode,
    base: &CurrencyCode,
) -> Result<Decimal> {
    if currency == base {
        return Ok(Decimal::ONE);
    }
    let rate = provider.rate(date, currency).await?;
    ensure_positive(currency, rate)
}

/// Adds `payment_<CUR>`/`commission_<CUR>` for the base currency and every
/// snapshot currency, using the historical rate on each operation's date.
pub async fn value_operations(
    operations: &Table<OperationRow>,
    rates: &Table<RateRow>,
    base: &CurrencyCode,
    provider: &dyn HistoricalRateProvider,
) -> Result<Table<ValuedOperation>> {
    let targets = target_currencies(rates, base);

    let lookups = required_lookups(operations, &targets, base);
    debug!(lookups = lookups.len(), "Prefetching historical rates");
    provider.prefetch(&lookups).await;

    let mut valued = Vec::with_capacity(operations.len());
    for op in operations.rows() {
        let rate = historical_rate(provider, op.date, &op.currency, base).await?;
        let payment_base = op.payment * rate;
        let commission_base = op.commission.map(|c| c * rate);

        let mut payments = BTreeMap::new();
        let mut commissions = BTreeMap::new();
        payments.insert(base.clone(), Cell::Value(payment_base));
        commissions.insert(base.clone(), Cell::from(commission_base));

        for target in &targets {
            let (payment, commission) = if target == &op.currency {
                (op.payment, op.commission)
            } else {
                let target_rate = historical_rate(provider, op.date, target, base).await?;
                (
                    payment_base / target_rate,
                    commission_base.map(|c| c / target_rate),
                )
            };
            payments.insert(target.clone(), Cell::Value(payment));
            commissions.insert(target.clone(), Cell::from(commission));
        }

        valued.push(ValuedOperation {
            operation: op.clone(),
            payments,
            commissions,
        });
    }

    Ok(Table::new(
        valued,
        column_currencies(base, &targets),
        operations.is_tagged(),
    ))
}

/// Converts one normalized account.
#[instrument(name = "ConvertAccount", skip_all, fields(base = %base))]
pub async fn convert_account(
    account: NormalizedAccount,
    base: &CurrencyCode,
    provider: &dyn HistoricalRateProvider,
) -> Result<ValuedAccount> {
    let positions = value_positions(&account.positions, &account.rates, base)?;
    let operations = value_operations(&account.operations, &account.rates, base, provider).await?;

    let defaulted = positions
        .rows()
        .iter()
        .filter(|p| p.rate_source == RateSource::Defaulted)
        .count();
    info!(
        positions = positions.len(),
        operations = operations.len(),
        defaulted,
        "Converted account"
    );

    Ok(ValuedAccount {
        positions,
        operations,
        rates: account.rates,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::error::PipelineError;
    use crate::core::normalize::normalize_account;
    use crate::core::normalize::tests::{raw_operation, raw_position};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic historical rates keyed by `(date, currency)`.
    pub(crate) struct MockRateProvider {
        rates: HashMap<(NaiveDate, String), Decimal>,
        pub(crate) calls: AtomicUsize,
    }

    impl MockRateProvider {
        pub(crate) fn new() -> Self {
            Self {
                rates: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn add_rate(&mut self, date: &str, currency: &str, rate: Decimal) {
            self.rates.insert((day(date), currency.to_string()), rate);
        }
    }

    #[async_trait]
    impl HistoricalRateProvider for MockRateProvider {
        async fn rate(&self, date: NaiveDate, currency: &CurrencyCode) -> Result<Decimal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates
                .get(&(date, currency.to_string()))
                .copied()
                .ok_or_else(|| PipelineError::RateUnavailable {
                    date,
                    currency: currency.to_string(),
                })
        }
    }

    pub(crate) fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rub() -> CurrencyCode {
        "RUB".parse().unwrap()
    }

    fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    fn rates(entries: &[(&str, Decimal)]) -> BTreeMap<String, Decimal> {
        entries.iter().map(|(c, r)| (c.to_string(), *r)).collect()
    }

    #[test]
    fn test_base_currency_position_copies_base_value() {
        let normalized = normalize_account(
            &[raw_position("A", "RUB", dec!(100), dec!(1), dec!(0))],
            &[],
            &rates(&[("USD", dec!(90.0))]),
            Some("Main"),
        )
        .unwrap();

        let valued = value_positions(&normalized.positions, &normalized.rates, &rub()).unwrap();
        let row = &valued.rows()[0];

        assert_eq!(row.rate_source, RateSource::Base);
        assert_eq!(row.values[&rub()], Cell::Value(dec!(100)));
        // Base-currency rows are not divided by the USD rate.
        assert_eq!(row.values[&code("USD")], Cell::Value(dec!(100)));
        assert_eq!(
            valued.column_names()[10..].to_vec(),
            vec!["account", "value_RUB", "value_USD"]
        );
    }

    #[test]
    fn test_foreign_position_divides_by_snapshot_rate() {
        let normalized = normalize_account(
            &[
                raw_position("A", "USD", dec!(10), dec!(2), dec!(1)),
                raw_position("B", "EUR", dec!(5), dec!(2), dec!(0)),
            ],
            &[],
            &rates(&[("USD", dec!(90)), ("EUR", dec!(100))]),
            None,
        )
        .unwrap();

        let valued = value_positions(&normalized.positions, &normalized.rates, &rub()).unwrap();
        let usd = &valued.rows()[0];
        assert_eq!(usd.rate_source, RateSource::Snapshot);
        assert_eq!(usd.values[&rub()], Cell::Value(dec!(1890)));
        assert_eq!(usd.values[&code("USD")], Cell::Value(dec!(21)));
        assert_eq!(usd.values[&code("EUR")], Cell::Value(dec!(18.9)));

        let eur = &valued.rows()[1];
        assert_eq!(eur.values[&rub()], Cell::Value(dec!(1000)));
        assert_eq!(eur.values[&code("EUR")], Cell::Value(dec!(10)));
        assert_eq!(
            eur.values[&code("USD")].value().unwrap().round_dp(6),
            dec!(11.111111)
        );
    }

    #[test]
    fn test_missing_snapshot_rate_defaults_to_one() {
        let normalized = normalize_account(
            &[raw_position("A", "GBP", dec!(10), dec!(1), dec!(0))],
            &[],
            &rates(&[("USD", dec!(90))]),
            None,
        )
        .unwrap();

        let valued = value_positions(&normalized.positions, &normalized.rates, &rub()).unwrap();
        let row = &valued.rows()[0];
        assert_eq!(row.rate_source, RateSource::Defaulted);
        assert_eq!(row.values[&rub()], Cell::Value(dec!(10)));
        assert_eq!(valued.text(0, "rate_source").as_deref(), Some("defaulted"));
    }

    #[test]
    fn test_zero_snapshot_rate_is_rejected() {
        let normalized = normalize_account(
            &[raw_position("A", "USD", dec!(10), dec!(1), dec!(0))],
            &[],
            &rates(&[("USD", dec!(90)), ("EUR", dec!(0))]),
            None,
        )
        .unwrap();

        let result = value_positions(&normalized.positions, &normalized.rates, &rub());
        assert_eq!(
            result.unwrap_err(),
            PipelineError::InvalidRate {
                currency: "EUR".to_string(),
                rate: Decimal::ZERO
            }
        );
    }

    #[tokio::test]
    async fn test_operation_uses_historical_rate() {
        let mut provider = MockRateProvider::new();
        provider.add_rate("2021-03-01", "USD", dec!(95.0));

        let normalized = normalize_account(
            &[],
            &[raw_operation("1", "2021-03-01", "USD", dec!(10), None)],
            &rates(&[("USD", dec!(90))]),
            None,
        )
        .unwrap();

        let valued = value_operations(&normalized.operations, &normalized.rates, &rub(), &provider)
            .await
            .unwrap();
        let row = &valued.rows()[0];

        assert_eq!(row.payments[&rub()], Cell::Value(dec!(950.0)));
        assert_eq!(row.payments[&code("USD")], Cell::Value(dec!(10)));
        assert_eq!(row.commissions[&rub()], Cell::Empty);
        assert_eq!(row.commissions[&code("USD")], Cell::Empty);
    }

    #[tokio::test]
    async fn test_operation_cross_currency_conversion() {
        let mut provider = MockRateProvider::new();
        provider.add_rate("2021-03-01", "USD", dec!(80));
        provider.add_rate("2021-03-01", "EUR", dec!(100));
        provider.add_rate("2021-03-02", "USD", dec!(50));
        provider.add_rate("2021-03-02", "EUR", dec!(40));

        let normalized = normalize_account(
            &[],
            &[
                raw_operation("1", "2021-03-01", "USD", dec!(-10), Some(dec!(-1))),
                raw_operation("2", "2021-03-02", "RUB", dec!(200), Some(dec!(-2))),
            ],
            &rates(&[("USD", dec!(90)), ("EUR", dec!(105))]),
            Some("Main"),
        )
        .unwrap();

        let valued = value_operations(&normalized.operations, &normalized.rates, &rub(), &provider)
            .await
            .unwrap();

        let usd_op = &valued.rows()[0];
        assert_eq!(usd_op.payments[&rub()], Cell::Value(dec!(-800)));
        assert_eq!(usd_op.commissions[&rub()], Cell::Value(dec!(-80)));
        assert_eq!(usd_op.payments[&code("EUR")], Cell::Value(dec!(-8)));
        assert_eq!(usd_op.commissions[&code("EUR")], Cell::Value(dec!(-0.8)));
        assert_eq!(usd_op.payments[&code("USD")], Cell::Value(dec!(-10)));

        let rub_op = &valued.rows()[1];
        assert_eq!(rub_op.payments[&rub()], Cell::Value(dec!(200)));
        assert_eq!(rub_op.payments[&code("USD")], Cell::Value(dec!(4)));
        assert_eq!(rub_op.payments[&code("EUR")], Cell::Value(dec!(5)));
        assert_eq!(rub_op.commissions[&code("EUR")], Cell::Value(dec!(-0.05)));

        assert_eq!(
            valued.column_names()[9..].to_vec(),
            vec![
                "account",
                "payment_RUB",
                "commission_RUB",
                "payment_EUR",
                "commission_EUR",
                "payment_USD",
                "commission_USD",
            ]
        );
    }

    #[tokio::test]
    async fn test_unavailable_rate_propagates() {
        let mut provider = MockRateProvider::new();
        provider.add_rate("2021-03-01", "USD", dec!(95));

        let normalized = normalize_account(
            &[],
            &[raw_operation("1", "2021-03-01", "USD", dec!(10), None)],
            &rates(&[("USD", dec!(90)), ("EUR", dec!(100))]),
            None,
        )
        .unwrap();

        let result =
            value_operations(&normalized.operations, &normalized.rates, &rub(), &provider).await;
        assert_eq!(
            result.unwrap_err(),
            PipelineError::RateUnavailable {
                date: day("2021-03-01"),
                currency: "EUR".to_string()
            }
        );
    }

    #[test]
    fn test_required_lookups_are_distinct() {
        let normalized = normalize_account(
            &[],
            &[
                raw_operation("1", "2021-03-01", "USD", dec!(1), None),
                raw_operation("2", "2021-03-01", "USD", dec!(2), None),
                raw_operation("3", "2021-03-01", "RUB", dec!(3), None),
            ],
            &BTreeMap::new(),
            None,
        )
        .unwrap();
        let targets = vec![code("USD"), code("EUR")];

        let lookups = required_lookups(&normalized.operations, &targets, &rub());
        assert_eq!(
            lookups,
            vec![
                (day("2021-03-01"), code("EUR")),
                (day("2021-03-01"), code("USD")),
            ]
        );
    }

    #[tokio::test]
    async fn test_base_currency_is_never_queried() {
        let provider = MockRateProvider::new();
        let normalized = normalize_account(
            &[],
            &[raw_operation("1", "2021-03-01", "RUB", dec!(10), Some(dec!(-1)))],
            &BTreeMap::new(),
            None,
        )
        .unwrap();

        let valued = value_operations(&normalized.operations, &normalized.rates, &rub(), &provider)
            .await
            .unwrap();
        assert_eq!(valued.rows()[0].payments[&rub()], Cell::Value(dec!(10)));
        assert_eq!(valued.rows()[0].commissions[&rub()], Cell::Value(dec!(-1)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
