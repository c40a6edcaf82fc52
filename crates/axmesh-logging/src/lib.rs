//! Structured JSONL logging for axmesh hosts
//!
//! The topology engine logs through `tracing` and never installs a
//! subscriber itself. Hosts (the simulation binary, a live monitor) use
//! this crate to do that once at startup.
//!
//! # Features
//!
//! - **JSONL Output**: One JSON object per line, the default on the console
//! - **Station Context**: Tag every line with the station an engine serves
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//! - **Per-target levels**: `RUST_LOG` or [`LogConfig::with_target`]
//!
//! # Quick Start
//!
//! ```ignore
//! use axmesh_logging::{AxmeshSubscriberBuilder, LogConfig};
//!
//! // JSONL to the console
//! let _guard = AxmeshSubscriberBuilder::new().init();
//!
//! // Pretty output while developing
//! let _guard = AxmeshSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # Station Context
//!
//! ```ignore
//! use axmesh_logging::{StationContextGuard, StationRole, station_span};
//!
//! let _guard = StationContextGuard::new(&local, StationRole::Replay);
//! let _span = station_span().entered();
//!
//! // Every line in this scope carries station = "N0CALL"
//! tracing::info!("Replaying capture");
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{StationContextData, StationContextGuard, StationRole};
pub use error::LoggingError;
pub use layers::{StationContextLayer, station_span};

use std::fs::{self, File};

use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Builder for configuring and installing the global subscriber
///
/// Console output is JSONL unless [`ConsoleConfig::pretty`] is set. File
/// output is always JSONL.
pub struct AxmeshSubscriberBuilder {
    config: LogConfig,
}

impl AxmeshSubscriberBuilder {
    /// Builder with the default configuration (JSONL to console)
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration this builder will install
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// `RUST_LOG` when set, otherwise the configured directives
    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.config.filter_directives())
                .map_err(|e| LoggingError::Config(e.to_string())),
        }
    }

    /// Output layers for the configuration, plus the file writer guard
    fn output_layers<S>(
        &self,
    ) -> Result<(Vec<Box<dyn Layer<S> + Send + Sync>>, Option<WorkerGuard>), LoggingError>
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup> + 'static,
    {
        let mut outputs: Vec<Box<dyn Layer<S> + Send + Sync>> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            if self.config.console.pretty {
                outputs.push(layers::pretty_layer(self.config.console.ansi));
            } else {
                outputs.push(layers::jsonl_layer(std::io::stdout, &self.config.jsonl));
            }
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            outputs.push(layers::jsonl_layer(writer, &self.config.jsonl));
            guard = Some(file_guard);
        }

        Ok((outputs, guard))
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output when dropped; keep it alive
    /// for the life of the program.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = self.env_filter()?;
        let (outputs, guard) = self.output_layers()?;

        Registry::default()
            .with(StationContextLayer::new())
            .with(outputs)
            .with(filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    /// Install the subscriber, reporting failure on stderr
    ///
    /// Logging is not worth aborting a host over; on failure the process
    /// keeps whatever subscriber it had.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: logging not initialized: {}", e);
                None
            }
        }
    }
}

impl Default for AxmeshSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for file output
///
/// `Never` truncates a single file at startup; the other strategies append
/// to rolling files.
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };
    let appender = RollingFileAppender::new(rotation, &config.directory, &config.prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    AxmeshSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    AxmeshSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for tests; ignores an already-installed subscriber
pub fn init_testing() {
    let _ = AxmeshSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_jsonl() {
        let builder = AxmeshSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert!(!builder.config().console.pretty);
    }

    #[test]
    fn test_builder_overrides() {
        let builder = AxmeshSubscriberBuilder::new()
            .with_config(LogConfig::development())
            .with_level("trace")
            .with_console(false);
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
    }

    #[test]
    fn test_output_layers_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let builder = AxmeshSubscriberBuilder::new().with_file_output(FileConfig {
            directory: dir.path().to_path_buf(),
            prefix: "unit".to_string(),
            rotation: RotationStrategy::Never,
        });
        let (outputs, guard) = builder.output_layers::<Registry>().unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(guard.is_some());
        assert!(dir.path().join("unit.log").exists());

        let quiet = AxmeshSubscriberBuilder::new().with_console(false);
        let (outputs, guard) = quiet.output_layers::<Registry>().unwrap();
        assert!(outputs.is_empty());
        assert!(guard.is_none());
    }

    #[test]
    fn test_init_twice_reports_error() {
        init_testing();
        let second = AxmeshSubscriberBuilder::new()
            .with_config(LogConfig::testing())
            .try_init();
        assert!(matches!(second, Err(LoggingError::AlreadyInitialized(_))));
    }
}
