//! Validate command implementation

use std::path::Path;

use colored::Colorize;
use mirror_core::{Endpoint, SyncConfig};
use serde::Serialize;

use crate::error::{CliError, Result};

#[derive(Debug, Serialize)]
struct EndpointSummary<'a> {
    id: &'a str,
    root: String,
    local: bool,
}

#[derive(Debug, Serialize)]
struct ValidationSummary<'a> {
    comparison_mode: String,
    watched: Vec<EndpointSummary<'a>>,
    destinations: Vec<EndpointSummary<'a>>,
    routes: Vec<String>,
}

fn summarize(endpoint: &Endpoint) -> EndpointSummary<'_> {
    EndpointSummary {
        id: endpoint.id.as_str(),
        root: endpoint.root.display().to_string(),
        local: endpoint.is_local(),
    }
}

/// Run the validate command
///
/// Performs the static checks plus a check that every local root exists.
/// Remote roots are only checked when a sync starts.
pub fn run_validate(config_path: &Path, json: bool) -> Result<()> {
    let config = SyncConfig::load(config_path)?;
    config.validate()?;

    for endpoint in config.watched_roots().into_iter().chain(config.destination_endpoints()) {
        if endpoint.is_local() && !endpoint.root.is_dir() {
            return Err(CliError::user(format!(
                "root of endpoint '{}' is not a directory: {}",
                endpoint.id,
                endpoint.root.display()
            )));
        }
    }

    let coordinator = config.to_coordinator()?;
    let summary = ValidationSummary {
        comparison_mode: format!("{:?}", config.comparison_mode).to_lowercase(),
        watched: config.watched_roots().into_iter().map(summarize).collect(),
        destinations: config
            .destination_endpoints()
            .into_iter()
            .map(summarize)
            .collect(),
        routes: coordinator.routes().iter().map(|r| r.to_string()).collect(),
    };

    if json {
        let output = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::user(format!("Failed to serialize summary: {}", e)))?;
        println!("{}", output);
        return Ok(());
    }

    println!(
        "{} {} is valid ({} comparison)",
        "OK".green().bold(),
        config_path.display().to_string().cyan(),
        summary.comparison_mode
    );
    for route in &summary.routes {
        println!("   {}", route);
    }
    Ok(())
}
