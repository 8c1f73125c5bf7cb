//! Backend configuration
//!
//! Configuration is loaded from a TOML document:
//!
//! ```toml
//! backend = "redis"
//! connect_timeout_ms = 500
//!
//! [redis.defaults]
//! host = "localhost"
//! port = 6379
//! db = 0
//!
//! [[redis.hosts]]
//! db = 0
//!
//! [[redis.hosts]]
//! host = "redis.example.org"
//! ```
//!
//! Each `[[redis.hosts]]` entry only overrides the fields it names.
//!
//! Or from environment variables:
//! - `ANALYTICS_CONFIG`: Path to a TOML file (takes precedence)
//! - `ANALYTICS_BACKEND`: `redis`, `memory` or `noop` (default: redis)
//! - `ANALYTICS_REDIS_HOSTS`: Comma list of `host[:port][/db]`

use crate::buckets::{Analytics, BucketCounter, NoopAnalytics};
use crate::error::{AnalyticsError, ConfigError, Result};
use crate::store::{InMemoryStore, RedisStore, RedisTarget};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Which [`Analytics`] implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Redis,
    Memory,
    Noop,
}

impl FromStr for BackendKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            "noop" => Ok(BackendKind::Noop),
            other => Err(AnalyticsError::invalid_argument(format!(
                "unknown analytics backend: {}",
                other
            ))),
        }
    }
}

/// Per-host overrides; unset fields come from [`RedisSettings::defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostOverride {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<i64>,
    pub password: Option<String>,
}

/// Connection defaults shared by every host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostDefaults {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for HostDefaults {
    fn default() -> Self {
        let target = RedisTarget::default();
        HostDefaults {
            host: target.host,
            port: target.port,
            db: target.db,
            password: target.password,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub defaults: HostDefaults,
    pub hosts: Vec<HostOverride>,
}

impl RedisSettings {
    /// One target per host entry, each merged over the defaults.
    pub fn targets(&self) -> Vec<RedisTarget> {
        self.hosts
            .iter()
            .map(|h| RedisTarget {
                host: h.host.clone().unwrap_or_else(|| self.defaults.host.clone()),
                port: h.port.unwrap_or(self.defaults.port),
                db: h.db.unwrap_or(self.defaults.db),
                password: h.password.clone().or_else(|| self.defaults.password.clone()),
            })
            .collect()
    }
}

/// Top-level analytics configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub backend: BackendKind,
    pub redis: RedisSettings,
    /// Connect timeout for Redis hosts; unset waits for the OS default
    pub connect_timeout_ms: Option<u64>,
}

impl AnalyticsConfig {
    pub fn from_toml_str(s: &str) -> std::result::Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var("ANALYTICS_CONFIG") {
            return Ok(Self::from_file(path)?);
        }

        Self::from_vars(
            std::env::var("ANALYTICS_BACKEND").ok().as_deref(),
            std::env::var("ANALYTICS_REDIS_HOSTS").ok().as_deref(),
        )
    }

    fn from_vars(backend: Option<&str>, hosts: Option<&str>) -> Result<Self> {
        let backend = match backend {
            Some(b) => b.parse()?,
            None => BackendKind::default(),
        };
        let hosts = match hosts {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(parse_host)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(AnalyticsConfig {
            backend,
            redis: RedisSettings {
                defaults: HostDefaults::default(),
                hosts,
            },
            connect_timeout_ms: None,
        })
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// Parse `host[:port][/db]`.
fn parse_host(spec: &str) -> Result<HostOverride> {
    let invalid = || AnalyticsError::invalid_argument(format!("invalid redis host: {}", spec));

    let (addr, db) = match spec.split_once('/') {
        Some((addr, db)) => (addr, Some(db.parse::<i64>().map_err(|_| invalid())?)),
        None => (spec, None),
    };
    let (host, port) = match addr.split_once(':') {
        Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
        None => (addr, None),
    };

    Ok(HostOverride {
        host: (!host.is_empty()).then(|| host.to_string()),
        port,
        db,
        password: None,
    })
}

/// Build the configured [`Analytics`] implementation.
pub fn create_backend(config: &AnalyticsConfig) -> Result<Box<dyn Analytics>> {
    match config.backend {
        BackendKind::Redis => {
            let mut store = RedisStore::new(config.redis.targets())?;
            if let Some(timeout) = config.connect_timeout() {
                store = store.with_connect_timeout(timeout);
            }
            info!(backend = "redis", shards = store.shard_count(), "analytics backend created");
            Ok(Box::new(BucketCounter::new(store)))
        }
        BackendKind::Memory => {
            info!(backend = "memory", "analytics backend created");
            Ok(Box::new(BucketCounter::new(InMemoryStore::new())))
        }
        BackendKind::Noop => {
            info!(backend = "noop", "analytics backend created");
            Ok(Box::new(NoopAnalytics))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    const SAMPLE: &str = r#"
backend = "redis"

[redis.defaults]
host = "localhost"
port = 6379
db = 0

[[redis.hosts]]
db = 0

[[redis.hosts]]
db = 1

[[redis.hosts]]
host = "redis.example.org"
"#;

    #[test]
    fn test_hosts_merge_over_defaults() {
        let config = AnalyticsConfig::from_toml_str(SAMPLE).unwrap();
        let targets = config.redis.targets();

        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].url(), "redis://localhost:6379/0");
        assert_eq!(targets[1].url(), "redis://localhost:6379/1");
        assert_eq!(targets[2].url(), "redis://redis.example.org:6379/0");
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = AnalyticsConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalyticsConfig::default());
        assert_eq!(config.backend, BackendKind::Redis);
        assert!(config.redis.hosts.is_empty());
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let err = AnalyticsConfig::from_toml_str("backend = \"cassandra\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AnalyticsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.redis.hosts.len(), 3);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalyticsConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_host_list_from_vars() {
        let config =
            AnalyticsConfig::from_vars(Some("Redis"), Some("cache-a:6380/2, cache-b, :6381"))
                .unwrap();
        let targets = config.redis.targets();

        assert_eq!(targets[0].url(), "redis://cache-a:6380/2");
        assert_eq!(targets[1].url(), "redis://cache-b:6379/0");
        assert_eq!(targets[2].url(), "redis://localhost:6381/0");
    }

    #[test]
    fn test_bad_host_spec_rejected() {
        let err = AnalyticsConfig::from_vars(None, Some("cache:notaport")).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
        assert!(AnalyticsConfig::from_vars(Some("mongo"), None).is_err());
    }

    #[test]
    fn test_redis_backend_without_hosts_fails() {
        let Err(err) = create_backend(&AnalyticsConfig::default()) else {
            panic!("Expected an error for a redis backend without hosts");
        };
        assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
    }

    #[test]
    fn test_redis_backend_connects_lazily() {
        let config = AnalyticsConfig::from_toml_str(SAMPLE).unwrap();
        assert!(create_backend(&config).is_ok());
    }

    #[test]
    fn test_memory_and_noop_backends() {
        let day = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap();

        let memory = create_backend(&AnalyticsConfig {
            backend: BackendKind::Memory,
            ..Default::default()
        })
        .unwrap();
        memory.track_metric("1".into(), "m".into(), day, 3).unwrap();
        assert_eq!(memory.get_count("1", "m", None, None).unwrap(), 3);

        let noop = create_backend(&AnalyticsConfig {
            backend: BackendKind::Noop,
            ..Default::default()
        })
        .unwrap();
        noop.track_metric("1".into(), "m".into(), day, 3).unwrap();
        assert_eq!(noop.get_count("1", "m", None, None).unwrap(), 0);
    }
}
