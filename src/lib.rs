pub mod aggregator;
pub mod cli;
pub mod core;
pub mod history;
pub mod providers;

use crate::aggregator::Aggregator;
use crate::cli::ui;
use crate::core::config::AppConfig;
use crate::history::{HistoryLog, Snapshot};
use crate::providers::{BinanceProvider, CryptonatorProvider};
use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    Run,
    History,
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// Fetches balances and rates, then appends the converted values as a new snapshot.
///
/// Nothing is written when any step before the append fails.
pub async fn run_pipeline(config: &AppConfig) -> Result<Snapshot> {
    let balance_source = BinanceProvider::new(&config.providers.binance)?;
    let rate_source = CryptonatorProvider::new(&config.providers.cryptonator)?;
    let history = HistoryLog::new(config.history_file_path()?);

    let conversions = Aggregator::new(&balance_source, &rate_source, &config.currencies)
        .compute_conversions()
        .await?;

    history.append_snapshot(&conversions)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Crypto wallet conversions starting...");
    let config = load_config(config_path)?;
    execute_command(command, &config).await
}

pub async fn execute_command(command: AppCommand, config: &AppConfig) -> Result<()> {
    match command {
        AppCommand::Run => {
            let snapshot = run_pipeline(config).await?;
            println!("{}", ui::display_snapshot(&snapshot));
        }
        AppCommand::History => {
            let history = HistoryLog::new(config.history_file_path()?);
            match history.latest()? {
                Some(snapshot) => println!("{}", ui::display_snapshot(&snapshot)),
                None => println!("No snapshots recorded at {}", history.path().display()),
            }
        }
    }
    Ok(())
}
