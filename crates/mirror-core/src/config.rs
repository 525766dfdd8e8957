//! Sync configuration file
//!
//! Loaded through [`mirror_fs::ConfigStore`], so TOML, JSON and YAML all
//! work. A minimal TOML file:
//!
//! ```toml
//! comparison_mode = "hash"
//!
//! [[endpoints]]
//! id = "work"
//! root = "/home/me/work"
//!
//! [[endpoints]]
//! id = "backup"
//! root = "/mnt/backup/work"
//!
//! [[mirrors]]
//! a = "work"
//! b = "backup"
//! ```

use std::path::Path;
use std::time::Duration;

use mirror_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::coordinator::{SyncCoordinator, SyncOptions};
use crate::endpoint::{Endpoint, EndpointId};
use crate::guard::ComparisonMode;
use crate::{Error, Result};

/// Bidirectional mirror between two local endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorPair {
    pub a: EndpointId,
    pub b: EndpointId,
}

/// One-way propagation from a local source to several destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOut {
    pub source: EndpointId,
    pub destinations: Vec<EndpointId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub comparison_mode: ComparisonMode,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: f64,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub mirrors: Vec<MirrorPair>,
    #[serde(default)]
    pub fan_out: Vec<FanOut>,
}

fn default_recursive() -> bool {
    true
}

fn default_poll_interval() -> f64 {
    1.0
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recursive: default_recursive(),
            comparison_mode: ComparisonMode::default(),
            poll_interval_seconds: default_poll_interval(),
            endpoints: Vec::new(),
            mirrors: Vec::new(),
            fan_out: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Read a configuration file; the format follows the extension.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(ConfigStore::new().load(&NormalizedPath::new(path))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        Ok(ConfigStore::new().save(&NormalizedPath::new(path), self)?)
    }

    pub fn endpoint(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| &e.id == id)
    }

    pub fn options(&self) -> Result<SyncOptions> {
        Ok(SyncOptions {
            recursive: self.recursive,
            comparison_mode: self.comparison_mode,
            poll_interval: self.poll_interval()?,
        })
    }

    fn poll_interval(&self) -> Result<Duration> {
        let seconds = self.poll_interval_seconds;
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(Error::config(format!(
                "poll_interval_seconds must be a positive number, got {}",
                seconds
            )));
        }
        Duration::try_from_secs_f64(seconds).map_err(|e| {
            Error::config(format!("poll_interval_seconds {} is out of range: {}", seconds, e))
        })
    }

    /// Endpoints that are watched for changes, in configuration order.
    pub fn watched_roots(&self) -> Vec<&Endpoint> {
        let ids = self
            .mirrors
            .iter()
            .flat_map(|m| [&m.a, &m.b])
            .chain(self.fan_out.iter().map(|f| &f.source));
        self.resolve_unique(ids)
    }

    /// Endpoints that receive propagated changes, in configuration order.
    pub fn destination_endpoints(&self) -> Vec<&Endpoint> {
        let ids = self
            .mirrors
            .iter()
            .flat_map(|m| [&m.a, &m.b])
            .chain(self.fan_out.iter().flat_map(|f| f.destinations.iter()));
        self.resolve_unique(ids)
    }

    fn resolve_unique<'a>(&'a self, ids: impl Iterator<Item = &'a EndpointId>) -> Vec<&'a Endpoint> {
        let mut seen: Vec<&EndpointId> = Vec::new();
        let mut resolved = Vec::new();
        for id in ids {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(endpoint) = self.endpoint(id) {
                resolved.push(endpoint);
            }
        }
        resolved
    }

    /// Static checks: everything that can be judged without touching an
    /// endpoint. Root reachability is checked when the sync starts.
    pub fn validate(&self) -> Result<()> {
        self.poll_interval()?;
        for endpoint in &self.endpoints {
            if !endpoint.is_local() && !endpoint.root.to_string_lossy().starts_with('/') {
                return Err(Error::config(format!(
                    "remote endpoint '{}' needs an absolute root, got {}",
                    endpoint.id,
                    endpoint.root.display()
                )));
            }
        }
        self.to_coordinator().map(|_| ())
    }

    /// Register every endpoint and wire every relationship.
    pub fn to_coordinator(&self) -> Result<SyncCoordinator> {
        let mut coordinator = SyncCoordinator::new(self.options()?);
        for endpoint in &self.endpoints {
            coordinator.register_endpoint(endpoint.clone())?;
        }
        for mirror in &self.mirrors {
            coordinator.wire_mirror(&mirror.a, &mirror.b)?;
        }
        for fan_out in &self.fan_out {
            coordinator.wire_fan_out(&fan_out.source, &fan_out.destinations)?;
        }
        if coordinator.routes().is_empty() {
            return Err(Error::config("no mirror or fan-out relationships configured"));
        }
        Ok(coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RemoteConfig;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn ids(endpoints: Vec<&Endpoint>) -> Vec<&str> {
        endpoints.into_iter().map(|e| e.id.as_str()).collect()
    }

    fn sample() -> SyncConfig {
        SyncConfig {
            endpoints: vec![
                Endpoint::local("a", "/data/a"),
                Endpoint::local("b", "/data/b"),
                Endpoint::local("src", "/data/src"),
                Endpoint::remote("far", "/srv/far", RemoteConfig::new("far.example", "mirror")),
            ],
            mirrors: vec![MirrorPair {
                a: "a".into(),
                b: "b".into(),
            }],
            fan_out: vec![FanOut {
                source: "src".into(),
                destinations: vec!["a".into(), "far".into()],
            }],
            ..SyncConfig::default()
        }
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert!(config.recursive);
        assert_eq!(config.comparison_mode, ComparisonMode::Hash);
        assert_eq!(config.options().unwrap().poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn derives_watched_and_destination_endpoints() {
        let config = sample();
        assert_eq!(ids(config.watched_roots()), vec!["a", "b", "src"]);
        assert_eq!(ids(config.destination_endpoints()), vec!["a", "b", "far"]);
    }

    #[test]
    fn sample_validates() {
        sample().validate().unwrap();
    }

    #[test]
    fn non_positive_poll_interval_is_rejected() {
        let config = SyncConfig {
            poll_interval_seconds: 0.0,
            ..sample()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn oversized_poll_interval_is_rejected() {
        let mut config: SyncConfig = toml::from_str(
            "poll_interval_seconds = 1e30\n\
             [[endpoints]]\nid = \"a\"\nroot = \"/data/a\"\n\
             [[endpoints]]\nid = \"b\"\nroot = \"/data/b\"\n\
             [[mirrors]]\na = \"a\"\nb = \"b\"\n",
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("out of range"), "{}", err);
        assert!(config.to_coordinator().is_err());

        config.poll_interval_seconds = 2.5;
        assert_eq!(config.options().unwrap().poll_interval, Duration::from_millis(2500));
    }

    #[test]
    fn relative_remote_root_is_rejected() {
        let mut config = sample();
        config.endpoints[3].root = "srv/far".into();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute root"), "{}", err);
    }

    #[test]
    fn config_without_relationships_is_rejected() {
        let config = SyncConfig {
            endpoints: vec![Endpoint::local("a", "/data/a")],
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_endpoint_in_fan_out_is_rejected() {
        let mut config = sample();
        config.fan_out[0].destinations.push("ghost".into());

        assert!(matches!(config.validate(), Err(Error::UnknownEndpoint { .. })));
    }

    #[test]
    fn save_then_load_in_every_format() {
        let temp = TempDir::new().unwrap();
        let config = sample();

        for name in ["sync.toml", "sync.json", "sync.yaml"] {
            let path = temp.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(SyncConfig::load(&path).unwrap(), config, "{}", name);
        }
    }

    #[test]
    fn parses_documented_example() {
        let config: SyncConfig = toml::from_str(
            r#"
comparison_mode = "mtime"
poll_interval_seconds = 0.5

[[endpoints]]
id = "work"
root = "/home/me/work"

[[endpoints]]
id = "offsite"
root = "/backup/work"

[endpoints.transport]
kind = "remote"
host = "backup.example"
username = "mirror"

[endpoints.transport.auth]
method = "password_env"
variable = "MIRROR_PASSWORD"

[[fan_out]]
source = "work"
destinations = ["offsite"]
"#,
        )
        .unwrap();

        assert_eq!(config.comparison_mode, ComparisonMode::Mtime);
        assert_eq!(ids(config.destination_endpoints()), vec!["offsite"]);
        config.validate().unwrap();
    }
}
