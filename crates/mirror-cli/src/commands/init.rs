//! Init command implementation
//!
//! Writes a starter configuration describing one source and its
//! destinations.

use std::path::{Path, PathBuf};

use colored::Colorize;
use mirror_core::{ComparisonMode, Endpoint, EndpointId, FanOut, MirrorPair, SyncConfig};

use crate::error::{CliError, Result};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub path: PathBuf,
    pub source: PathBuf,
    pub destinations: Vec<PathBuf>,
    pub mirror: bool,
    pub mode: ComparisonMode,
    pub force: bool,
}

/// Run the init command
pub fn run_init(options: &InitOptions) -> Result<()> {
    if options.path.exists() && !options.force {
        return Err(CliError::user(format!(
            "{} already exists (use --force to overwrite)",
            options.path.display()
        )));
    }

    let config = build_config(options)?;
    config.validate()?;
    config.save(&options.path)?;

    println!(
        "{} Wrote {}",
        "OK".green().bold(),
        options.path.display().to_string().cyan()
    );
    for endpoint in &config.endpoints {
        println!("   {} {}", endpoint.id.as_str().yellow(), endpoint.root.display());
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Build the configuration for `options` without touching the disk.
pub fn build_config(options: &InitOptions) -> Result<SyncConfig> {
    if options.mirror && options.destinations.len() != 1 {
        return Err(CliError::user("--mirror takes exactly one --destination"));
    }

    let source_id = EndpointId::from("source");
    let mut endpoints = vec![Endpoint::local(source_id.clone(), absolute(&options.source)?)];
    let mut destination_ids = Vec::new();
    for (index, destination) in options.destinations.iter().enumerate() {
        let id = if options.destinations.len() == 1 {
            EndpointId::from("destination")
        } else {
            EndpointId::new(format!("destination-{}", index + 1))
        };
        endpoints.push(Endpoint::local(id.clone(), absolute(destination)?));
        destination_ids.push(id);
    }

    let mut config = SyncConfig {
        comparison_mode: options.mode,
        endpoints,
        ..SyncConfig::default()
    };
    if options.mirror {
        config.mirrors.push(MirrorPair {
            a: source_id,
            b: destination_ids.remove(0),
        });
    } else {
        config.fan_out.push(FanOut {
            source: source_id,
            destinations: destination_ids,
        });
    }
    Ok(config)
}
