//! Covey CLI - Command line interface for covey
//!
//! Synchronizes branch-experiment working directories and submits their
//! batch runs.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::RunArgs;

/// Covey: branch-experiment synchronization and batch dispatch
#[derive(Parser, Debug)]
#[command(name = "covey")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Synchronize every configured branch and submit its runs
    #[command(visible_alias = "r")]
    Run(RunArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Progress lines are emitted at info; RUST_LOG still wins when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Some(Commands::Version) => {
            println!("covey {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run(args)) => {
            args.execute(cli.verbose)?;
        }
        None => {
            println!("Covey - branch-experiment synchronization and batch dispatch");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
