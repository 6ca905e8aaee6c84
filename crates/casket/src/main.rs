//! Casket - CAS-locked web session store
//!
//! Main entry point for the Casket operator CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{check, codecs, simulate};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Casket - CAS-locked web session store on a key-value cache
#[derive(Parser)]
#[command(name = "casket")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: discovered casket.toml)
    #[arg(short, long, global = true, env = "CASKET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration and show the resolved store settings
    Check(check::CheckArgs),

    /// Run session traffic against an in-process cache
    Simulate(simulate::SimulateArgs),

    /// Compare compression codecs on a payload
    Codecs(codecs::CodecsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = casket_config::load_config(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("loading config from {}", path.display()),
            None => "loading config".to_string(),
        }
    })?;

    let _guard = logging::init(&loaded.config.logging, cli.verbose)?;
    tracing::debug!(source = ?loaded.source, "Configuration loaded");

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config: loaded,
    };

    match cli.command {
        Commands::Check(args) => check::run(args, &ctx).await,
        Commands::Simulate(args) => simulate::run(args, &ctx).await,
        Commands::Codecs(args) => codecs::run(args, &ctx).await,
    }
}
