use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use cointrack::AppCommand;
use cointrack::core::log::init_logging;
use cointrack::history::{HistoryQuery, TotalsQuery};
use std::path::PathBuf;

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

#[derive(Args)]
struct ListArgs {
    /// Maximum number of entries to show (0 for all)
    #[arg(short, long, default_value_t = 100)]
    limit: usize,

    /// Show newest entries first
    #[arg(short, long)]
    reverse: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Track balances, refreshing on a timer (space: refresh, enter: quit)
    Watch,
    /// Display exported balance history
    History {
        /// Values CSV file (defaults to the configured export)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Only show this asset
        #[arg(short, long)]
        asset: Option<String>,
        /// Only show this source
        #[arg(short, long)]
        source: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Display exported portfolio totals
    Totals {
        /// Totals CSV file (defaults to the configured export)
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List tracked assets and their sources
    Assets {
        /// Values CSV file (defaults to the configured export)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Convert CSV exports into XLSX workbooks with charts
    Convert {
        #[arg(long)]
        values_file: PathBuf,
        #[arg(long)]
        totals_file: PathBuf,
        /// Directory the workbooks are written to
        #[arg(long, default_value = "exports")]
        output_path: PathBuf,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Watch => AppCommand::Watch,
            Commands::History {
                file,
                asset,
                source,
                list,
            } => AppCommand::History {
                file,
                query: HistoryQuery {
                    asset,
                    source,
                    descending: list.reverse,
                    limit: list.limit,
                },
            },
            Commands::Totals { file, list } => AppCommand::Totals {
                file,
                query: TotalsQuery {
                    descending: list.reverse,
                    limit: list.limit,
                },
            },
            Commands::Assets { file } => AppCommand::Assets { file },
            Commands::Convert {
                values_file,
                totals_file,
                output_path,
            } => AppCommand::Convert {
                values_file,
                totals_file,
                output_path,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => cointrack::cli::setup::setup_at_path(path),
            None => cointrack::cli::setup::setup(),
        },
        Some(cmd) => cointrack::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
