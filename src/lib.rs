pub mod cli;
pub mod core;
pub mod export;
pub mod history;
pub mod providers;

use crate::core::config::{AppConfig, ExportConfig, ExportFormat};
use crate::history::{HistoryQuery, TotalsQuery};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

/// Commands that need the runtime or the configuration.
#[derive(Debug, Clone)]
pub enum AppCommand {
    Watch,
    History {
        file: Option<PathBuf>,
        query: HistoryQuery,
    },
    Totals {
        file: Option<PathBuf>,
        query: TotalsQuery,
    },
    Assets {
        file: Option<PathBuf>,
    },
    Convert {
        values_file: PathBuf,
        totals_file: PathBuf,
        output_path: PathBuf,
    },
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// CSV export the history commands read when no file is given.
fn default_csv(config_path: Option<&str>, totals: bool) -> Result<PathBuf> {
    let config = load_config(config_path)
        .context("No history file given and the configuration could not be loaded")?;
    let csv = ExportConfig {
        format: ExportFormat::Csv,
        ..config.export
    };
    Ok(if totals {
        csv.totals_path()
    } else {
        csv.values_path()
    })
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    match command {
        AppCommand::Watch => {
            let config = load_config(config_path)?;
            cli::watch::watch(&config).await
        }
        AppCommand::History { file, query } => {
            let path = match file {
                Some(path) => path,
                None => default_csv(config_path, false)?,
            };
            cli::history::show_history(&path, &query)
        }
        AppCommand::Totals { file, query } => {
            let path = match file {
                Some(path) => path,
                None => default_csv(config_path, true)?,
            };
            cli::history::show_totals(&path, &query)
        }
        AppCommand::Assets { file } => {
            let path = match file {
                Some(path) => path,
                None => default_csv(config_path, false)?,
            };
            cli::history::show_assets(&path)
        }
        AppCommand::Convert {
            values_file,
            totals_file,
            output_path,
        } => {
            let summary = tokio::task::spawn_blocking(move || {
                cli::convert::convert(&values_file, &totals_file, &output_path)
            })
            .await
            .context("Conversion task panicked")??;
            println!(
                "Converted {} value rows and {} total rows into {} and {}",
                summary.values_rows,
                summary.totals_rows,
                summary.values_workbook.display(),
                summary.totals_workbook.display()
            );
            Ok(())
        }
    }
}
