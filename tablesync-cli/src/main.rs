//! tablesync: keep a REST table and a local JSON snapshot in step.
//!
//! # Usage
//!
//! ```text
//! tablesync merge [--dry-run] [--json]
//! tablesync update-stars [--json]
//! ```
//!
//! Configuration comes from the environment; a `.env` file in the working
//! directory is loaded first when present.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{merge::MergeArgs, update_stars::UpdateStarsArgs};
use tablesync_core::Config;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tablesync",
    version,
    about = "Reconcile a remote REST table with a local JSON snapshot",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the remote table with the snapshot and write the result to both.
    Merge(MergeArgs),

    /// Refresh GitHub star counts on the remote table.
    UpdateStars(UpdateStarsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Merge(args) => args.run(&config),
        Commands::UpdateStars(args) => args.run(&config),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
