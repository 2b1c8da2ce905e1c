//! Runs normalization and conversion for every account and stacks the results.

use crate::core::currency::{CurrencyCode, HistoricalRateProvider};
use crate::core::equivalence::{ValuedOperation, ValuedPosition, convert_account};
use crate::core::error::Result;
use crate::core::normalize::{RateRow, normalize_account};
use crate::core::records::RawAccount;
use crate::core::table::Table;
use futures::future::join_all;
use tracing::{debug, info};

/// Combined datasets of all accounts.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedData {
    pub positions: Table<ValuedPosition>,
    pub operations: Table<ValuedOperation>,
    pub rates: Table<RateRow>,
}

/// Normalizes and converts every account, then concatenates each family.
///
/// Accounts are processed concurrently but combined in the order given.
/// Any account failure aborts the whole aggregation; the error is tagged
/// with the first failing account in input order.
pub async fn aggregate_accounts(
    accounts: &[(String, RawAccount)],
    base: &CurrencyCode,
    provider: &dyn HistoricalRateProvider,
) -> Result<CombinedData> {
    info!(accounts = accounts.len(), base = %base, "Aggregating accounts");

    let futures = accounts.iter().map(|(name, raw)| async move {
        let normalized =
            normalize_account(&raw.positions, &raw.operations, &raw.rates, Some(name.as_str()))
                .map_err(|e| e.in_account(name))?;
        convert_account(normalized, base, provider)
            .await
            .map_err(|e| e.in_account(name))
    });

    let valued = join_all(futures)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let mut positions = Vec::with_capacity(valued.len());
    let mut operations = Vec::with_capacity(valued.len());
    let mut rates = Vec::with_capacity(valued.len());
    for account in valued {
        positions.push(account.positions);
        operations.push(account.operations);
        rates.push(account.rates);
    }

    let combined = CombinedData {
        positions: Table::concat(positions),
        operations: Table::concat(operations),
        rates: Table::concat(rates),
    };
    debug!(
        positions = combined.positions.len(),
        operations = combined.operations.len(),
        rates = combined.rates.len(),
        "Concatenated account tables"
    );

    Ok(combined)
}
