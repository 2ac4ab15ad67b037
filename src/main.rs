use anyhow::Result;
use clap::{Parser, Subcommand};
use cwc::core::log::init_logging;

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
    /// Fetch balances and rates, and append a snapshot (default)
    Run,
    /// Display the latest recorded snapshot
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config_path = cli.config_path.as_deref();
    let result = match cli.command {
        Some(Commands::Setup) => cwc::cli::setup::setup(),
        Some(Commands::History) => cwc::run_command(cwc::AppCommand::History, config_path).await,
        Some(Commands::Run) | None => cwc::run_command(cwc::AppCommand::Run, config_path).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
