//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::logging::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unknown log format: {0}")]
    UnknownLogFormat(String),
}

/// Configuration for a vote ledger node.
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "debug,votechain=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seal whatever is pending when the node shuts down.
    #[serde(default = "default_true")]
    pub seal_on_shutdown: bool,

    /// Most candidate chains considered per fork resolution.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_candidates() -> usize {
    64
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            log_format: default_log_format(),
            log_level: default_log_level(),
            seal_on_shutdown: default_true(),
            max_candidates: default_max_candidates(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        match self.log_format.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::UnknownLogFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(NodeConfig::from_toml_str("").unwrap(), NodeConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = NodeConfig::from_toml_str(
            r#"
            log_format = "json"
            seal_on_shutdown = false
            "#,
        )
        .unwrap();
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
        assert!(!config.seal_on_shutdown);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_candidates, 64);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str("max_candidates = \"many\""),
            Err(ConfigError::Toml(_))
        ));
        let config = NodeConfig {
            log_format: "xml".to_string(),
            ..NodeConfig::default()
        };
        assert!(matches!(config.log_format(), Err(ConfigError::UnknownLogFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            NodeConfig::from_toml_file("/nonexistent/votechain.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
