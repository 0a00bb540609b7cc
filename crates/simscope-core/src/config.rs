//! Configuration loading and typed config structures for Simscope.
//!
//! The launcher reads `simscope.yaml` from the working directory. Every
//! field has a default, so an empty or missing file is a valid
//! configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The file parsed but a value is unusable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `simscope.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimscopeConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Per-session engine settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which reference model the launcher serves.
    #[serde(default)]
    pub demo: DemoConfig,
}

impl SimscopeConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides:
    /// - `PORT` overrides `server.port`
    /// - `SIMSCOPE_HOST` overrides `server.host`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.server.apply_env_overrides();
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string. Environment
    /// overrides are not applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.n_sims == 0 {
            return Err(invalid("session.n_sims must be at least 1"));
        }
        if self.session.queue_capacity == 0 {
            return Err(invalid("session.queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static client files served for unmatched routes.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl ServerSection {
    /// Override host and port with environment variables when set.
    ///
    /// An unparseable `PORT` is ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Ok(host) = std::env::var("SIMSCOPE_HOST") {
            self.host = host;
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

/// Per-session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Number of instances run side by side in each session.
    #[serde(default = "default_n_sims")]
    pub n_sims: usize,

    /// Highest step a client may request.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Incoming messages buffered per session before the reader waits.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            n_sims: default_n_sims(),
            max_steps: default_max_steps(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Launcher model selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfig {
    /// Model key: `counter`, `life`, or `turtle`.
    #[serde(default = "default_model")]
    pub model: String,

    /// Display name override. The model's own name is used when unset.
    #[serde(default)]
    pub name: Option<String>,

    /// Description override.
    #[serde(default)]
    pub description: Option<String>,

    /// Seed for models that draw random numbers.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            name: None,
            description: None,
            seed: default_seed(),
        }
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    3000
}

const fn default_n_sims() -> usize {
    1
}

const fn default_max_steps() -> u64 {
    100_000
}

const fn default_queue_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_model() -> String {
    "life".to_owned()
}

const fn default_seed() -> u64 {
    42
}
