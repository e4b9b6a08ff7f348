//! CLI interface for trailguard
//!
//! Provides subcommands for:
//! - `run`: Start the engine on the live price feed
//! - `status`: Show ledger balances and open trades from the state store
//! - `config`: Show the effective configuration

mod run;
mod status;

pub use run::RunArgs;
pub use status::StatusArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "trailguard")]
#[command(about = "Risk-gated order execution with trailing-stop exit management")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine until Ctrl-C
    Run(RunArgs),
    /// Show ledger balances and open trades
    Status(StatusArgs),
    /// Show the effective configuration
    Config,
}
