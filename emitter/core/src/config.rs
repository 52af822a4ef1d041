//! TOML Configuration File Support
//!
//! Loads worker settings from `~/.config/node-event/emitter.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments, via [`ConfigOverrides`]
//! 2. Environment variables (`EMITTER_QUEUE_CAPACITY`, `EMITTER_OVERFLOW_POLICY`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [worker]
//! queue_capacity = 64
//! overflow_policy = "block"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::{OverflowPolicy, WorkerConfig};

/// Environment variable overriding the queue capacity
pub const ENV_QUEUE_CAPACITY: &str = "EMITTER_QUEUE_CAPACITY";
/// Environment variable overriding the overflow policy
pub const ENV_OVERFLOW_POLICY: &str = "EMITTER_OVERFLOW_POLICY";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Worker section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerToml {
    /// Maximum queued events per worker
    pub queue_capacity: Option<usize>,

    /// What a full queue does to an emit
    pub overflow_policy: Option<OverflowPolicy>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterToml {
    /// Worker configuration section
    pub worker: WorkerToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Effective configuration after all layers are applied
#[derive(Clone, Debug)]
pub struct EmitterConfigFile {
    /// Worker queue settings
    pub worker: WorkerConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for EmitterConfigFile {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl EmitterConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the highest-priority layer that set a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that the values can be used to build a worker
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] when the queue capacity is
    /// not a non-zero power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.worker.queue_capacity;
        if !capacity.is_power_of_two() {
            return Err(ConfigError::ValidationError(format!(
                "queue_capacity must be a non-zero power of two, got {capacity}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/node-event/emitter.toml` or
/// `~/.config/node-event/emitter.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("node-event").join("emitter.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting values are invalid. A missing file is not an error.
pub fn load_config() -> Result<EmitterConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<EmitterConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, resolving environment variables through `env`
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<E>(path: Option<PathBuf>, env: E) -> Result<EmitterConfigFile, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = EmitterConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: EmitterToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut EmitterConfigFile, toml: &EmitterToml) {
    if let Some(capacity) = toml.worker.queue_capacity {
        config.worker.queue_capacity = capacity;
    }
    if let Some(policy) = toml.worker.overflow_policy {
        config.worker.overflow_policy = policy;
    }
}

fn apply_env_config<E>(config: &mut EmitterConfigFile, env: E)
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(capacity) = env(ENV_QUEUE_CAPACITY) {
        match capacity.trim().parse::<usize>() {
            Ok(n) => {
                config.worker.queue_capacity = n;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(
                value = %capacity,
                error = %e,
                "Ignoring {ENV_QUEUE_CAPACITY}"
            ),
        }
    }
    if let Some(policy) = env(ENV_OVERFLOW_POLICY) {
        match policy.parse::<OverflowPolicy>() {
            Ok(p) => {
                config.worker.overflow_policy = p;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring {ENV_OVERFLOW_POLICY}"),
        }
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values given on the command line, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Queue capacity override
    pub queue_capacity: Option<usize>,

    /// Overflow policy override
    pub overflow_policy: Option<OverflowPolicy>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set queue capacity override
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set overflow policy override
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = Some(policy);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override is invalid.
    pub fn apply(&self, config: &mut EmitterConfigFile) -> Result<(), ConfigError> {
        if self.queue_capacity.is_some() || self.overflow_policy.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(capacity) = self.queue_capacity {
            config.worker.queue_capacity = capacity;
        }
        if let Some(policy) = self.overflow_policy {
            config.worker.overflow_policy = policy;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
