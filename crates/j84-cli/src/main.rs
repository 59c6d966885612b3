//! j84 - J1939-84 OBD compliance runner
//!
//! Runs the steps of a J1939-84 part against a simulated bus or a
//! recorded candump log and reports the outcomes.

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use j84_engine::ComplianceConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::RunOptions;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "j84")]
#[command(author, version, about = "J1939-84 OBD compliance runner")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "J84_CONFIG", default_value = "j84.toml")]
    config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the steps of the configured part
    Run {
        /// Step number(s) to run, e.g. --step 3 --step 4
        #[arg(long = "step")]
        steps: Vec<u8>,

        /// Replay a candump log instead of the configured bus
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Write the bus event log to this file as JSON
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Validate the configuration file and print it resolved
    CheckConfig,

    /// List the PGN/SPN catalog
    Catalog {
        /// Only show this PGN
        #[arg(long)]
        pgn: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "j84=debug,j84_engine=debug,j84_bus=debug"
    } else {
        "j84=info,j84_engine=info,j84_bus=debug"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);
    match execute(cli, &ctx).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            ctx.error(&format!("Error: {:#}", e));
            ExitCode::from(2)
        }
    }
}

/// Execute the selected command; `Ok(false)` means the run found failures
async fn execute(cli: Cli, ctx: &OutputContext) -> Result<bool> {
    let config = ComplianceConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            steps,
            replay,
            events,
        } => {
            let options = RunOptions {
                steps,
                replay,
                events,
            };
            let failed = commands::run(config, options, ctx).await?;
            Ok(!failed)
        }
        Commands::CheckConfig => {
            commands::check_config(&config, ctx)?;
            Ok(true)
        }
        Commands::Catalog { pgn } => {
            commands::catalog(&config, pgn, ctx)?;
            Ok(true)
        }
    }
}
