pub mod cli;
pub mod core;
pub mod providers;

use crate::core::config::AppConfig;
use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    Aggregate,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("InvestBoard starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(
        base_currency = %config.base_currency,
        accounts = config.accounts.len(),
        "Loaded config"
    );

    match command {
        AppCommand::Aggregate => cli::aggregate::run(&config).await,
    }
}
