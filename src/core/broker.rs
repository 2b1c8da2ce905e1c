//! Broker data supplier abstraction and per-account fetching.

use crate::core::error::{PipelineError, Result};
use crate::core::records::{RawAccount, RawOperation, RawPosition};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn portfolio(&self, account_id: &str) -> Result<Vec<RawPosition>>;

    async fn operations(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawOperation>>;

    /// Current quotes of the basic currencies in the base currency.
    async fn exchange_rates(&self) -> Result<BTreeMap<String, Decimal>>;
}

async fn fetch_account(
    client: &dyn BrokerClient,
    id: &str,
    from: NaiveDate,
    until: DateTime<Utc>,
) -> Result<RawAccount> {
    let from = from.and_time(chrono::NaiveTime::MIN).and_utc();
    let positions = client.portfolio(id).await?;
    let operations = client.operations(id, from, until).await?;
    let rates = client.exchange_rates().await?;
    Ok(RawAccount {
        positions,
        operations,
        rates,
    })
}

/// Fetches the raw data of every account, keyed by account name.
///
/// The three lists are parallel; unequal lengths fail before any request
/// is made. Results keep the order of `names`.
pub async fn fetch_accounts(
    client: &dyn BrokerClient,
    names: &[String],
    ids: &[String],
    starting_dates: &[NaiveDate],
    until: DateTime<Utc>,
) -> Result<Vec<(String, RawAccount)>> {
    if names.len() != ids.len() || names.len() != starting_dates.len() {
        return Err(PipelineError::MismatchedInputLengths {
            names: names.len(),
            ids: ids.len(),
            dates: starting_dates.len(),
        });
    }
    info!(accounts = names.len(), "Fetching broker accounts");

    let futures = names
        .iter()
        .zip(ids)
        .zip(starting_dates)
        .map(|((name, id), from)| async move {
            debug!(account = %name, %from, "Requesting account data");
            fetch_account(client, id, *from, until)
                .await
                .map(|raw| (name.clone(), raw))
                .map_err(|e| e.in_account(name))
        });

    join_all(futures).await.into_iter().collect()
}
