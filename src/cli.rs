//! Command-line interface for pineforge.
//!
//! Provides commands for running prediction pipelines over datasets and for
//! inspecting the runcard collection.

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use crate::config::ForgeConfig;
use crate::pipeline::{Orchestrator, RunSpec};
use crate::process::SystemRunner;

/// Default PDF set convolved against generated grids.
const DEFAULT_PDF: &str = "NNPDF31_nlo_as_0118_luxqed";

/// Interpolation-grid prediction pipeline for pQCD observables.
#[derive(Parser)]
#[command(name = "pineforge")]
#[command(about = "Generate pQCD prediction grids from dataset runcards")]
#[command(version)]
#[command(
    long_about = "pineforge renders dataset runcards, drives the external generator or \
structure-function calculator, and merges the outputs into annotated, compressed \
interpolation grids.\n\nExample usage:\n  pineforge run LHCB_WP_8TEV\n  \
pineforge run HERA_NC_318GEV-20260801093000 --pdf CT18NLO"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the prediction pipeline for one or more datasets.
    #[command(alias = "r")]
    Run(RunArgs),

    /// List the datasets available in the runcard collection.
    #[command(alias = "ls")]
    List,
}

/// Arguments for `pineforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Dataset names. Append `-<timestamp>` to resume a previous generation
    /// directory instead of generating anew.
    #[arg(required = true)]
    pub datasets: Vec<String>,

    /// PDF set convolved against the generated grid.
    #[arg(short, long, default_value = DEFAULT_PDF)]
    pub pdf: String,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI arguments and executes the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Executes the selected command with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;

    match cli.command {
        Commands::Run(args) => {
            let orchestrator = Orchestrator::new(config, Arc::new(SystemRunner));
            // datasets run strictly one after another: the external tools
            // saturate the machine on their own
            for dataset in &args.datasets {
                let spec = RunSpec::parse(dataset, &args.pdf)?;
                let summary = orchestrator.run(&spec).await?;
                info!(
                    "[{}] finished: {} bin(s), artifact at {}",
                    summary.dataset,
                    summary.bins,
                    summary.artifact.display()
                );
            }
            Ok(())
        }
        Commands::List => {
            let mut datasets: Vec<String> = std::fs::read_dir(&config.runcards)?
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_dir())
                .filter_map(|entry| entry.file_name().to_str().map(String::from))
                .collect();
            datasets.sort();
            for dataset in datasets {
                println!("{dataset}");
            }
            Ok(())
        }
    }
}
