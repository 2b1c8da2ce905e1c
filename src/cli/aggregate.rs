use crate::core::aggregate::{CombinedData, aggregate_accounts};
use crate::core::broker::fetch_accounts;
use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::table::{Record, Table};
use crate::providers::{CachingRateProvider, CbrRateProvider, TinkoffClient};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Fetches every configured account and runs the conversion pipeline.
pub async fn collect(config: &AppConfig) -> Result<CombinedData> {
    let lists = config.account_lists()?;

    let client = TinkoffClient::new(config.tinkoff_base_url(), &config.token)
        .with_base(config.base_currency.clone());
    let accounts = fetch_accounts(
        &client,
        &lists.names,
        &lists.ids,
        &lists.starting_dates,
        Utc::now(),
    )
    .await?;

    let (cbr_url, lookback_days) = config.cbr_settings();
    let daily_cache = Arc::new(Cache::new("cbr-daily"));
    let rates = CachingRateProvider::new(
        CbrRateProvider::new(cbr_url, lookback_days, daily_cache)
            .with_base(config.base_currency.clone()),
    );

    let data = aggregate_accounts(&accounts, &config.base_currency, &rates).await?;
    info!(
        positions = data.positions.len(),
        operations = data.operations.len(),
        "Aggregation complete"
    );
    Ok(data)
}

fn describe<R: Record>(label: &str, table: &Table<R>) -> String {
    format!(
        "{label}: {} rows [{}]",
        table.len(),
        table.column_names().join(", ")
    )
}

/// One line per combined dataset.
pub fn display_summary(data: &CombinedData) -> String {
    [
        describe("positions", &data.positions),
        describe("operations", &data.operations),
        describe("rates", &data.rates),
    ]
    .join("\n")
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let data = collect(config).await?;
    println!("{}", display_summary(&data));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::equivalence::tests::MockRateProvider;
    use crate::core::normalize::tests::{raw_operation, raw_position};
    use crate::core::records::RawAccount;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_summary_lists_rows_and_columns() {
        let raw = RawAccount {
            positions: vec![raw_position("BBG1", "USD", dec!(10), dec!(2), dec!(1))],
            operations: vec![raw_operation("1", "2021-03-01", "RUB", dec!(-100), None)],
            rates: BTreeMap::from([("USD".to_string(), dec!(90))]),
        };
        let mut provider = MockRateProvider::new();
        provider.add_rate("2021-03-01", "USD", dec!(95));
        let data = aggregate_accounts(&[("Main".to_string(), raw)], &CurrencyCode::rub(), &provider)
            .await
            .unwrap();

        let summary = display_summary(&data);
        let lines: Vec<&str> = summary.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("positions: 1 rows ["));
        assert!(lines[0].contains("value_RUB, value_USD"));
        assert!(lines[0].contains("account"));
        assert!(lines[1].starts_with("operations: 1 rows ["));
        assert!(lines[1].contains("payment_USD"));
        assert!(lines[2].starts_with("rates: 1 rows ["));
    }
}
