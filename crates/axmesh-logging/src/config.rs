//! Configuration types for the logging system

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LoggingError;

/// Main logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level (overridden by RUST_LOG when set)
    pub default_level: String,

    /// Console output configuration
    pub console: ConsoleConfig,

    /// File output configuration
    pub file: Option<FileConfig>,

    /// JSONL formatting
    pub jsonl: JsonlConfig,

    /// Per-target level overrides, e.g. `axmesh_routing = "debug"`
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Verbose, human-readable console output
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
                ansi: true,
            },
            ..Default::default()
        }
    }

    /// JSONL files only, rotated daily
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig {
                enabled: false,
                pretty: false,
                ansi: false,
            },
            file: Some(FileConfig {
                directory: log_dir,
                ..FileConfig::default()
            }),
            ..Default::default()
        }
    }

    /// Warnings only, plain console
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            ..Default::default()
        }
    }

    /// Raise or lower the level for one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// `EnvFilter` directive string: default level first, then target overrides
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default_level.clone()];
        directives.extend(
            self.targets
                .iter()
                .map(|(target, level)| format!("{}={}", target, level)),
        );
        directives.join(",")
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, LoggingError> {
        serde_json::from_str(json).map_err(|e| LoggingError::Config(e.to_string()))
    }
}

/// Console output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Enable console output
    pub enabled: bool,
    /// Human-readable format instead of JSONL
    pub pretty: bool,
    /// ANSI colors (pretty format only)
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
            ansi: false,
        }
    }
}

/// File output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Directory for log files
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Rotation strategy
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "axmesh".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RotationStrategy {
    /// Rotate daily
    #[default]
    Daily,
    /// Rotate hourly
    Hourly,
    /// Single file, truncated at startup
    Never,
}

/// JSONL formatting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonlConfig {
    /// Put event fields at the top level of each line
    pub flatten_events: bool,
    /// Include the list of entered spans (carries station context)
    pub include_spans: bool,
    /// Include file and line
    pub include_location: bool,
    /// Include thread ids and names
    pub include_thread_info: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
            include_thread_info: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, "info");
        assert!(config.console.enabled);
        assert!(!config.console.pretty); // JSONL by default
        assert!(config.file.is_none());
    }

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.default_level, "debug");
        assert!(dev.console.pretty);

        let prod = LogConfig::production(PathBuf::from("/var/log/axmesh"));
        assert!(!prod.console.enabled);
        assert_eq!(prod.file.unwrap().directory, PathBuf::from("/var/log/axmesh"));

        assert_eq!(LogConfig::testing().default_level, "warn");
    }

    #[test]
    fn test_filter_directives() {
        let config = LogConfig::default()
            .with_target("axmesh_routing", "debug")
            .with_target("axmesh_simulation", "trace");
        assert_eq!(
            config.filter_directives(),
            "info,axmesh_routing=debug,axmesh_simulation=trace"
        );
    }

    #[test]
    fn test_from_json() {
        let config = LogConfig::development().with_target("axmesh_routing", "trace");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(LogConfig::from_json(&json).unwrap(), config);
        assert!(matches!(LogConfig::from_json("{"), Err(LoggingError::Config(_))));
    }
}
