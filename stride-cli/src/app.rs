use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stride_config::load_config;

use crate::serve::{self, ServeArgs};
use crate::simulate::{self, SimulateArgs};
use crate::state::{self, StateInspectArgs};
use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(author, version, about = "Stride community movement challenge")]
pub struct Cli {
    /// Increases logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Selects which configuration environment to load (maps to config/{env}.toml)
    #[arg(long, default_value = "default")]
    env: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingestion backend and leaderboard surfaces
    Serve(ServeArgs),
    /// Post synthetic movement events at a running backend
    Simulate(SimulateArgs),
    /// Inspect persisted runtime state
    State {
        #[command(subcommand)]
        action: StateCommand,
    },
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// Print participants and totals from a ledger database
    Inspect(StateInspectArgs),
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.env)).context("failed to load configuration")?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| match cli.verbose {
        0 => config.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    });

    let log_override = match &cli.command {
        Commands::Serve(args) => args.resolved_log_path(&config),
        _ => None,
    };

    init_tracing(&filter, log_override.as_deref()).context("failed to initialize logging")?;

    match cli.command {
        Commands::Serve(args) => serve::run(args, &config).await?,
        Commands::Simulate(args) => simulate::run(args, &config).await?,
        Commands::State {
            action: StateCommand::Inspect(args),
        } => state::inspect_ledger(args, &config).await?,
    }

    Ok(())
}
