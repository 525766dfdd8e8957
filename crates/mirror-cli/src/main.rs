//! dirmirror CLI
//!
//! Watches local directory trees and keeps mirrors and fan-out destinations
//! in step with them.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    tracing::debug!(command = ?cli.command, "Parsed command line");

    match cli.command {
        Commands::Run { config } => commands::run_sync(&config).await,
        Commands::Validate { config, json } => commands::run_validate(&config, json),
        Commands::Init {
            path,
            source,
            destinations,
            mirror,
            mode,
            force,
        } => commands::run_init(&commands::InitOptions {
            path,
            source,
            destinations,
            mirror,
            mode: mode.into(),
            force,
        }),
    }
}
