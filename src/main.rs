use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use investboard::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch all accounts and build the combined currency-normalized datasets
    Aggregate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => investboard::cli::setup::setup_at_path(path),
            None => investboard::cli::setup::setup(),
        },
        Some(Commands::Aggregate) => {
            investboard::run_command(
                investboard::AppCommand::Aggregate,
                cli.config_path.as_deref(),
            )
            .await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
