//! Configuration management for hive-server
//!
//! Values are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config` or `HIVE_CONFIG`)
//! 3. `HIVE_*` environment variables, one per field (`HIVE_RC_TICK_MS=20`)
//! 4. Command line flags
//!
//! # Example TOML
//!
//! ```toml
//! log_level = "info"
//! log_json = false
//! fence_file = "/etc/hive/fence.json"
//! rc_tick_ms = 50
//! rc_failsafe_ms = 2000
//! heartbeat_secs = 2
//! connection_ttl_secs = 5
//! simulate = "sim-1"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use hive_core::{ActorConfig, NodeConfig};
use hive_transport::{LineConfig, TopicConfig, WireConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "HIVE_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse config file
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment variable with an unusable value
    #[error("invalid value for {name}: {value:?}")]
    Env { name: String, value: String },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Emit logs as JSON lines.
    pub log_json: bool,
    /// JSON file with the two corners of the fence to install at startup.
    pub fence_file: Option<PathBuf>,
    /// Lifetime of a request sent to a remote peer.
    pub callback_timeout_ms: u64,
    /// Delivery grace between in-process endpoints.
    pub line_grace_ms: u64,
    /// Delivery grace toward client connections.
    pub client_grace_ms: u64,
    /// Inbox size of in-process lines.
    pub line_capacity: usize,
    pub rc_tick_ms: u64,
    pub rc_failsafe_ms: u64,
    pub goto_timeout_ms: u64,
    pub task_pool_size: usize,
    pub topic_grace_ms: u64,
    pub heartbeat_secs: u64,
    pub connection_ttl_secs: u64,
    pub reap_interval_secs: u64,
    /// Attach a simulated vehicle with this id.
    pub simulate: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            fence_file: None,
            callback_timeout_ms: 60_000,
            line_grace_ms: 100,
            client_grace_ms: 10,
            line_capacity: 1,
            rc_tick_ms: 50,
            rc_failsafe_ms: 2_000,
            goto_timeout_ms: 60_000,
            task_pool_size: 8,
            topic_grace_ms: 100,
            heartbeat_secs: 2,
            connection_ttl_secs: 5,
            reap_interval_secs: 30,
            simulate: None,
        }
    }
}

/// Command line values that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub log_json: bool,
    pub fence_file: Option<PathBuf>,
    pub simulate: Option<String>,
}

impl HubConfig {
    /// Resolve every layer and validate the result.
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        let config = config.with_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file; missing fields keep their defaults.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `HIVE_<FIELD>` variables. Unrelated variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(field) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let field = field.to_ascii_lowercase();
            let bad = || ConfigError::Env {
                name: name.clone(),
                value: value.clone(),
            };
            match field.as_str() {
                "log_level" => self.log_level = value.clone(),
                "log_json" => self.log_json = parse_bool(&value).ok_or_else(bad)?,
                "fence_file" => self.fence_file = Some(PathBuf::from(&value)),
                "simulate" => self.simulate = Some(value.clone()),
                "callback_timeout_ms" => self.callback_timeout_ms = value.parse().map_err(|_| bad())?,
                "line_grace_ms" => self.line_grace_ms = value.parse().map_err(|_| bad())?,
                "client_grace_ms" => self.client_grace_ms = value.parse().map_err(|_| bad())?,
                "line_capacity" => self.line_capacity = value.parse().map_err(|_| bad())?,
                "rc_tick_ms" => self.rc_tick_ms = value.parse().map_err(|_| bad())?,
                "rc_failsafe_ms" => self.rc_failsafe_ms = value.parse().map_err(|_| bad())?,
                "goto_timeout_ms" => self.goto_timeout_ms = value.parse().map_err(|_| bad())?,
                "task_pool_size" => self.task_pool_size = value.parse().map_err(|_| bad())?,
                "topic_grace_ms" => self.topic_grace_ms = value.parse().map_err(|_| bad())?,
                "heartbeat_secs" => self.heartbeat_secs = value.parse().map_err(|_| bad())?,
                "connection_ttl_secs" => self.connection_ttl_secs = value.parse().map_err(|_| bad())?,
                "reap_interval_secs" => self.reap_interval_secs = value.parse().map_err(|_| bad())?,
                // HIVE_CONFIG names the file itself.
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply command line overrides.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref level) = overrides.log_level {
            self.log_level = level.clone();
        }
        if overrides.log_json {
            self.log_json = true;
        }
        if let Some(ref path) = overrides.fence_file {
            self.fence_file = Some(path.clone());
        }
        if let Some(ref id) = overrides.simulate {
            self.simulate = Some(id.clone());
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("callback_timeout_ms", self.callback_timeout_ms),
            ("line_grace_ms", self.line_grace_ms),
            ("client_grace_ms", self.client_grace_ms),
            ("line_capacity", self.line_capacity as u64),
            ("rc_tick_ms", self.rc_tick_ms),
            ("rc_failsafe_ms", self.rc_failsafe_ms),
            ("goto_timeout_ms", self.goto_timeout_ms),
            ("task_pool_size", self.task_pool_size as u64),
            ("topic_grace_ms", self.topic_grace_ms),
            ("heartbeat_secs", self.heartbeat_secs),
            ("connection_ttl_secs", self.connection_ttl_secs),
            ("reap_interval_secs", self.reap_interval_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be > 0")));
        }

        if self.heartbeat_secs >= self.connection_ttl_secs {
            return Err(ConfigError::Invalid(format!(
                "heartbeat_secs ({}) must be shorter than connection_ttl_secs ({})",
                self.heartbeat_secs, self.connection_ttl_secs
            )));
        }

        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".to_string()));
        }

        if let Some(id) = &self.simulate {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid("simulate needs a vehicle id".to_string()));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Typed views for the core crates
    // ========================================================================

    pub fn line_config(&self) -> LineConfig {
        LineConfig {
            capacity: self.line_capacity,
            grace: Duration::from_millis(self.line_grace_ms),
        }
    }

    pub fn actor_config(&self) -> ActorConfig {
        ActorConfig {
            line: self.line_config(),
            rc_tick: Duration::from_millis(self.rc_tick_ms),
            rc_failsafe: Duration::from_millis(self.rc_failsafe_ms),
            goto_timeout: Duration::from_millis(self.goto_timeout_ms),
        }
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            line: LineConfig {
                capacity: self.line_capacity,
                grace: Duration::from_millis(self.client_grace_ms),
            },
            heartbeat: Duration::from_secs(self.heartbeat_secs),
            info_timeout: Duration::from_millis(self.callback_timeout_ms),
            ..NodeConfig::default()
        }
    }

    pub fn wire_config(&self) -> WireConfig {
        WireConfig {
            outgoing_grace: Duration::from_millis(self.client_grace_ms),
            callback_timeout: Duration::from_millis(self.callback_timeout_ms),
            ..WireConfig::default()
        }
    }

    pub fn topic_config(&self) -> TopicConfig {
        TopicConfig {
            grace: Duration::from_millis(self.topic_grace_ms),
            ..TopicConfig::default()
        }
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Test default configuration values
    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.rc_tick_ms, 50);
        assert_eq!(config.rc_failsafe_ms, 2_000);
        assert_eq!(config.heartbeat_secs, 2);
        assert_eq!(config.connection_ttl_secs, 5);
        assert!(config.fence_file.is_none());
        assert!(config.validate().is_ok());
    }

    /// Test partial TOML keeps defaults for missing fields
    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "rc_tick_ms = 20\nsimulate = \"sim-1\"").unwrap();

        let config = HubConfig::load_file(file.path()).unwrap();
        assert_eq!(config.rc_tick_ms, 20);
        assert_eq!(config.simulate.as_deref(), Some("sim-1"));
        assert_eq!(config.goto_timeout_ms, 60_000);
    }

    /// Test malformed TOML is reported
    #[test]
    fn test_load_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "rc_tick_ms = \"fast\"").unwrap();
        assert!(matches!(HubConfig::load_file(file.path()), Err(ConfigError::Parse(_))));
    }

    /// Test missing file is reported with its path
    #[test]
    fn test_load_missing_file() {
        let err = HubConfig::load_file(Path::new("/nonexistent/hive.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hive.toml"));
    }

    /// Test environment overrides
    #[test]
    fn test_env_overrides() {
        let mut config = HubConfig::default();
        config
            .apply_env(env(&[
                ("HIVE_RC_TICK_MS", "25"),
                ("HIVE_LOG_JSON", "true"),
                ("HIVE_FENCE_FILE", "/tmp/fence.json"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();
        assert_eq!(config.rc_tick_ms, 25);
        assert!(config.log_json);
        assert_eq!(config.fence_file, Some(PathBuf::from("/tmp/fence.json")));
    }

    /// Test unparseable environment values are rejected
    #[test]
    fn test_env_invalid_value() {
        let mut config = HubConfig::default();
        let err = config.apply_env(env(&[("HIVE_LINE_CAPACITY", "many")])).unwrap_err();
        assert!(err.to_string().contains("HIVE_LINE_CAPACITY"));
    }

    /// Test command line wins over earlier layers
    #[test]
    fn test_cli_overrides() {
        let mut config = HubConfig::default();
        config.apply_env(env(&[("HIVE_LOG_LEVEL", "warn")])).unwrap();
        let config = config.with_overrides(&CliOverrides {
            log_level: Some("debug".to_string()),
            simulate: Some("sim-9".to_string()),
            ..CliOverrides::default()
        });
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.simulate.as_deref(), Some("sim-9"));
        assert!(!config.log_json);
    }

    /// Test validation rejects zero values
    #[test]
    fn test_validate_zero_values() {
        let config = HubConfig {
            rc_tick_ms: 0,
            ..HubConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rc_tick_ms"));

        let config = HubConfig {
            line_capacity: 0,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    /// Test heartbeat must refresh before the marker expires
    #[test]
    fn test_validate_heartbeat_ttl() {
        let config = HubConfig {
            heartbeat_secs: 5,
            connection_ttl_secs: 5,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    /// Test typed views carry the configured values
    #[test]
    fn test_typed_views() {
        let config = HubConfig {
            rc_tick_ms: 20,
            client_grace_ms: 15,
            line_capacity: 32,
            ..HubConfig::default()
        };
        let actor = config.actor_config();
        assert_eq!(actor.rc_tick, Duration::from_millis(20));
        assert_eq!(actor.line.capacity, 32);
        assert_eq!(config.node_config().line.grace, Duration::from_millis(15));
        assert_eq!(config.wire_config().outgoing_grace, Duration::from_millis(15));
        assert_eq!(config.wire_config().inbox_capacity, WireConfig::default().inbox_capacity);
    }
}
