//! Endpoints: one side of a mirror relationship

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transport::{LocalTransport, Transport};
use crate::{Error, Result};

/// Unique name of an endpoint within one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How an endpoint's tree is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Local,
    Remote,
}

/// Transport settings of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    #[default]
    Local,
    Remote(RemoteConfig),
}

/// Connection settings for a remote endpoint reached over SFTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Applies to connecting and to each blocking protocol round-trip.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub auth: RemoteAuth,
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            timeout_seconds: default_timeout(),
            auth: RemoteAuth::default(),
        }
    }

    /// `host:port`, used in logs and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where credentials for a remote session come from.
///
/// Secrets are never stored in the configuration itself, only the name of
/// the environment variable or agent that supplies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RemoteAuth {
    #[default]
    Agent,
    KeyFile {
        private_key: PathBuf,
        #[serde(default)]
        passphrase_env: Option<String>,
    },
    PasswordEnv {
        variable: String,
    },
}

/// One side of a mirror relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub root: PathBuf,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Endpoint {
    pub fn local(id: impl Into<EndpointId>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            transport: TransportConfig::Local,
        }
    }

    pub fn remote(id: impl Into<EndpointId>, root: impl Into<PathBuf>, config: RemoteConfig) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            transport: TransportConfig::Remote(config),
        }
    }

    pub fn transport_kind(&self) -> TransportKind {
        match self.transport {
            TransportConfig::Local => TransportKind::Local,
            TransportConfig::Remote(_) => TransportKind::Remote,
        }
    }

    pub fn is_local(&self) -> bool {
        self.transport_kind() == TransportKind::Local
    }
}

/// Creates the transports through which endpoints are reached.
///
/// The coordinator asks for a fresh transport for every worker and every
/// route probe, so no two tasks ever share one session.
pub trait TransportFactory: Send + Sync {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>>;
}

/// Local filesystem access, and SFTP for remote endpoints when built with
/// the `sftp` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
        match &endpoint.transport {
            TransportConfig::Local => Ok(Box::new(LocalTransport::new(&endpoint.root))),
            #[cfg(feature = "sftp")]
            TransportConfig::Remote(config) => {
                use crate::transport::{RemoteTransport, SftpConnector};
                Ok(Box::new(RemoteTransport::new(
                    &endpoint.root,
                    SftpConnector::new(config.clone()),
                )))
            }
            #[cfg(not(feature = "sftp"))]
            TransportConfig::Remote(_) => Err(Error::config(format!(
                "endpoint '{}' is remote but SFTP support was not compiled in",
                endpoint.id
            ))),
        }
    }
}

/// Ids must be non-empty and free of whitespace so they read well in logs.
pub(crate) fn validate_id(id: &EndpointId) -> Result<()> {
    if id.as_str().is_empty() || id.as_str().chars().any(char::is_whitespace) {
        return Err(Error::config(format!("invalid endpoint id '{}'", id)));
    }
    Ok(())
}
