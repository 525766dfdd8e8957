//! Error types for mirror-core

use std::path::PathBuf;

use crate::endpoint::EndpointId;

/// Result type for mirror-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mirror-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or inconsistent sync configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The same endpoint id was registered twice
    #[error("Endpoint '{id}' is already registered")]
    DuplicateEndpoint { id: EndpointId },

    /// A relationship names an endpoint that was never registered
    #[error("Unknown endpoint '{id}'")]
    UnknownEndpoint { id: EndpointId },

    /// Only local endpoints can be watched for changes
    #[error("Endpoint '{id}' cannot be watched: {reason}")]
    NotWatchable { id: EndpointId, reason: String },

    /// An endpoint root is missing or unreachable at startup
    #[error("Root of endpoint '{id}' is unavailable: {reason}")]
    RootUnavailable { id: EndpointId, reason: String },

    /// A transport operation failed
    #[error("{operation} failed for {path} on {endpoint}: {source}")]
    Transport {
        endpoint: String,
        operation: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A remote session could not be opened
    #[error("Could not connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// The source file disappeared before it could be propagated
    #[error("Source file vanished: {path}")]
    SourceVanished { path: PathBuf },

    /// The watch collaborator failed
    #[error("Watch error: {message}")]
    Watch { message: String },

    /// A worker or watch task ended abnormally
    #[error("Task failed: {message}")]
    Task { message: String },

    /// Filesystem error from mirror-fs
    #[error(transparent)]
    Fs(#[from] mirror_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error is a race with a concurrent change rather than a
    /// real failure: the file an action needed is gone, so there is nothing
    /// left to do.
    pub fn is_race(&self) -> bool {
        matches!(self, Self::SourceVanished { .. })
    }
}

impl From<notify::Error> for Error {
    fn from(e: notify::Error) -> Self {
        Self::Watch {
            message: e.to_string(),
        }
    }
}
