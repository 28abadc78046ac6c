//! Configuration loading for feedsync.
//!
//! Configuration is loaded from a TOML file (default: `feedsync.toml`).
//! Every field has a default, so an empty file is valid; only `watch`
//! against a real network needs an `[endpoint]`.

use feedsync_client::{Endpoint, PipelineConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for feedsync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Remote collection to sync.
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    /// Pipeline tunables.
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Snapshot persistence.
    #[serde(default)]
    pub snapshot: SnapshotSection,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Seconds before the first tick (default: 0).
    #[serde(default)]
    pub initial_delay_secs: u64,
    /// Seconds between ticks (default: 30). Zero disables periodic polling.
    #[serde(default = "default_poll_period_secs")]
    pub poll_period_secs: u64,
    /// Attempts per fetch before giving up (default: 4).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff unit in milliseconds (default: 1000).
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    /// Items kept in memory and in the snapshot (default: 50).
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
    /// Seconds a cached response is served without asking the server (default: 15).
    /// Zero always asks.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Assume connectivity at startup (default: true).
    #[serde(default = "default_start_online")]
    pub start_online: bool,
}

/// Snapshot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSection {
    /// Artifact name prefix (default: `feed`).
    #[serde(default = "default_snapshot_name")]
    pub name: String,
    /// Directory override (default: the data directory).
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_poll_period_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_max_retained() -> usize {
    50
}

fn default_cache_ttl_secs() -> u64 {
    15 // below the default poll period, so ticks reach the server
}

fn default_start_online() -> bool {
    true
}

fn default_snapshot_name() -> String {
    "feed".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: 0,
            poll_period_secs: default_poll_period_secs(),
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            max_retained: default_max_retained(),
            cache_ttl_secs: default_cache_ttl_secs(),
            start_online: default_start_online(),
        }
    }
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            name: default_snapshot_name(),
            dir: None,
        }
    }
}

impl PipelineSection {
    /// Convert to the engine's configuration.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_initial_delay(Duration::from_secs(self.initial_delay_secs))
            .with_poll_period(Duration::from_secs(self.poll_period_secs))
            .with_retry(self.max_attempts, Duration::from_millis(self.backoff_unit_ms))
            .with_max_retained(self.max_retained)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_start_online(self.start_online)
    }
}

impl SnapshotSection {
    /// Directory holding the snapshot artifacts.
    pub fn dir_or(&self, data_dir: &std::path::Path) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| data_dir.to_path_buf())
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_client::CredentialPlacement;
    use feedsync_types::PayloadShape;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.endpoint.is_none());
        assert_eq!(config.pipeline.poll_period_secs, 30);
        assert_eq!(config.pipeline.max_attempts, 4);
        assert_eq!(config.snapshot.name, "feed");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.max_retained, 50);
        assert!(config.pipeline.start_online);
        assert!(config.snapshot.dir.is_none());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[endpoint]
url = "http://api.openweathermap.org/data/2.5/find"
newer_param = "since"
conditional = true
payload = { envelope = { field = "list" } }
credential = { query_param = { name = "appid" } }

[endpoint.query]
q = "London"
units = "metric"

[pipeline]
poll_period_secs = 60
backoff_unit_ms = 250
cache_ttl_secs = 0

[snapshot]
name = "weather"
dir = "/var/lib/feedsync"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        let endpoint = config.endpoint.unwrap();
        assert_eq!(endpoint.query.get("q").map(String::as_str), Some("London"));
        assert_eq!(endpoint.newer_param.as_deref(), Some("since"));
        assert!(endpoint.conditional);
        assert_eq!(endpoint.payload, PayloadShape::envelope("list"));
        assert_eq!(
            endpoint.credential,
            CredentialPlacement::QueryParam {
                name: "appid".into()
            }
        );
        assert_eq!(config.pipeline.poll_period_secs, 60);
        assert_eq!(config.pipeline.max_attempts, 4);
        assert_eq!(config.snapshot.name, "weather");
        assert_eq!(config.snapshot.dir, Some(PathBuf::from("/var/lib/feedsync")));
    }

    #[test]
    fn pipeline_section_converts() {
        let section = PipelineSection {
            initial_delay_secs: 2,
            poll_period_secs: 10,
            max_attempts: 3,
            backoff_unit_ms: 500,
            max_retained: 20,
            cache_ttl_secs: 5,
            start_online: false,
        };
        let config = section.to_pipeline_config();

        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.poll_period, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_unit, Duration::from_millis(500));
        assert_eq!(config.max_retained, 20);
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(5)));
        assert!(!config.start_online);
    }

    #[test]
    fn zero_ttl_is_kept() {
        let section = PipelineSection {
            cache_ttl_secs: 0,
            ..PipelineSection::default()
        };
        assert_eq!(section.to_pipeline_config().cache_ttl, Some(Duration::ZERO));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedsync.toml");
        std::fs::write(&path, "[pipeline]\npoll_period_secs = \"soon\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("feedsync.toml"));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
