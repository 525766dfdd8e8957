//! Run command implementation
//!
//! Starts the coordinator with OS notifications and runs until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use mirror_core::{NotifyWatchService, SyncConfig};
use tracing::info;

use crate::error::Result;

/// Run the sync until interrupted
pub async fn run_sync(config_path: &Path) -> Result<()> {
    let config = SyncConfig::load(config_path)?;
    config.validate()?;
    let watched = config.watched_roots().len();
    let destinations = config.destination_endpoints().len();

    let running = config
        .to_coordinator()?
        .start(Arc::new(NotifyWatchService))
        .await?;

    println!(
        "{} Watching {} root(s), propagating to {} destination(s). Press Ctrl-C to stop.",
        "=>".blue().bold(),
        watched,
        destinations
    );

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    let summary = running.stop().await?;
    println!(
        "{} Stopped: {} applied, {} failed",
        "OK".green().bold(),
        summary.applied(),
        summary.failed()
    );
    Ok(())
}
