use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::currency::CurrencyCode;
use crate::providers::{cbr, tinkoff};

const STARTING_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccountConfig {
    pub name: String,
    pub id: String,
    /// First day of the operations history, `dd.mm.yyyy`.
    pub starting_date: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TinkoffProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CbrProviderConfig {
    pub base_url: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

fn default_lookback_days() -> u32 {
    cbr::DEFAULT_LOOKBACK_DAYS
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub tinkoff: Option<TinkoffProviderConfig>,
    pub cbr: Option<CbrProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            tinkoff: Some(TinkoffProviderConfig {
                base_url: tinkoff::DEFAULT_BASE_URL.to_string(),
            }),
            cbr: Some(CbrProviderConfig {
                base_url: cbr::DEFAULT_BASE_URL.to_string(),
                lookback_days: cbr::DEFAULT_LOOKBACK_DAYS,
            }),
        }
    }
}

fn default_base_currency() -> CurrencyCode {
    CurrencyCode::rub()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub token: String,
    #[serde(default = "default_base_currency")]
    pub base_currency: CurrencyCode,
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Parallel per-account inputs for fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountLists {
    pub names: Vec<String>,
    pub ids: Vec<String>,
    pub starting_dates: Vec<NaiveDate>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "investboard", "investboard")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!(accounts = config.accounts.len(), "Successfully loaded config");
        Ok(config)
    }

    pub fn tinkoff_base_url(&self) -> &str {
        self.providers
            .tinkoff
            .as_ref()
            .map_or(tinkoff::DEFAULT_BASE_URL, |p| &p.base_url)
    }

    pub fn cbr_settings(&self) -> (&str, u32) {
        self.providers.cbr.as_ref().map_or(
            (cbr::DEFAULT_BASE_URL, cbr::DEFAULT_LOOKBACK_DAYS),
            |p| (p.base_url.as_str(), p.lookback_days),
        )
    }

    pub fn account_lists(&self) -> Result<AccountLists> {
        let mut lists = AccountLists {
            names: Vec::with_capacity(self.accounts.len()),
            ids: Vec::with_capacity(self.accounts.len()),
            starting_dates: Vec::with_capacity(self.accounts.len()),
        };
        for account in &self.accounts {
            let date = NaiveDate::parse_from_str(&account.starting_date, STARTING_DATE_FORMAT)
                .with_context(|| {
                    format!(
                        "Invalid starting date '{}' for account '{}', expected dd.mm.yyyy",
                        account.starting_date, account.name
                    )
                })?;
            lists.names.push(account.name.clone());
            lists.ids.push(account.id.clone());
            lists.starting_dates.push(date);
        }
        Ok(lists)
    }
}
