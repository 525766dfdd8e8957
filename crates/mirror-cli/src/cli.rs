//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mirror_core::ComparisonMode;

/// dirmirror - keep directory trees in sync as files change
#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Watch the configured roots and propagate changes until Ctrl-C
    Run {
        /// Configuration file (.toml, .json, .yaml)
        #[arg(short, long, env = "MIRROR_CONFIG", default_value = "mirror.toml")]
        config: PathBuf,
    },

    /// Check a configuration without starting any watch
    Validate {
        /// Configuration file (.toml, .json, .yaml)
        #[arg(short, long, env = "MIRROR_CONFIG", default_value = "mirror.toml")]
        config: PathBuf,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Write a starter configuration
    ///
    /// Examples:
    ///   mirror init --source ~/work --destination /mnt/backup/work
    ///   mirror init --source ~/a --destination ~/b --mirror
    Init {
        /// Where to write the configuration
        #[arg(default_value = "mirror.toml")]
        path: PathBuf,

        /// Local directory to watch
        #[arg(long)]
        source: PathBuf,

        /// Directory to propagate to (repeatable)
        #[arg(long = "destination", required = true)]
        destinations: Vec<PathBuf>,

        /// Mirror both ways instead of fanning out (one destination only)
        #[arg(long)]
        mirror: bool,

        /// How existing files are compared
        #[arg(long, value_enum, default_value_t = ModeArg::Hash)]
        mode: ModeArg,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Hash,
    Mtime,
}

impl From<ModeArg> for ComparisonMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Hash => ComparisonMode::Hash,
            ModeArg::Mtime => ComparisonMode::Mtime,
        }
    }
}
