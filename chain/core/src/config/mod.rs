//! TOML Configuration File Support
//!
//! Listener settings live in `$XDG_CONFIG_HOME/control-chain/listener.toml`
//! (typically `~/.config/control-chain/listener.toml`).
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables (`CONTROL_CHAIN_SOCKET`, `CONTROL_CHAIN_MAX_FRAME`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! A missing configuration file is not an error.
//!
//! # Example Configuration
//!
//! ```toml
//! [daemon]
//! socket_path = "/tmp/control-chain.sock"
//! max_frame_size = 1048576
//! read_buffer_size = 4096
//!
//! [ready_override]
//! marker = "/etc/udev/rules.d/60-arduino.rules"
//! device = "/dev/arduino"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE};

/// Where the daemon listens unless configured otherwise
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/control-chain.sock";

/// Default capacity of the handle → listener command channel
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Environment variable overriding the socket path
pub const ENV_SOCKET: &str = "CONTROL_CHAIN_SOCKET";

/// Environment variable overriding the maximum frame size
pub const ENV_MAX_FRAME: &str = "CONTROL_CHAIN_MAX_FRAME";

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

/// Tracks where the most significant configuration value came from
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

/// `[daemon]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonToml {
    /// Unix socket path of the daemon
    pub socket_path: Option<String>,

    /// Largest accepted incoming frame in bytes
    pub max_frame_size: Option<usize>,

    /// Size of a single socket read
    pub read_buffer_size: Option<usize>,
}

/// `[ready_override]` section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadyOverrideToml {
    /// Path whose presence enables the override
    pub marker: String,

    /// Device node whose absence triggers it
    pub device: String,
}

/// Whole configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerToml {
    /// Daemon connection settings
    pub daemon: DaemonToml,

    /// Optional early-readiness rule
    pub ready_override: Option<ReadyOverrideToml>,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Flip readiness as soon as the socket connects when `marker` exists but
/// `device` does not
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyOverride {
    /// Path whose presence enables the override
    pub marker: PathBuf,
    /// Device node whose absence triggers it
    pub device: PathBuf,
}

/// Resolved listener configuration
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Unix socket path of the daemon
    pub socket_path: PathBuf,

    /// Largest accepted incoming frame in bytes
    pub max_frame_size: usize,

    /// Size of a single socket read
    pub read_buffer_size: usize,

    /// Capacity of the command channel between handles and the listener
    pub command_capacity: usize,

    /// Optional early-readiness rule
    pub ready_override: Option<ReadyOverride>,

    /// Path the file values came from, if any
    pub config_file_path: Option<PathBuf>,

    /// Source of the highest-priority value applied
    pub source: ConfigSource,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            ready_override: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ListenerConfig {
    /// Use a different socket path
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Use a different maximum frame size
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Enable the ready override
    #[must_use]
    pub fn with_ready_override(mut self, ready_override: ReadyOverride) -> Self {
        self.ready_override = Some(ready_override);
        self
    }

    /// Check values that would make the listener unusable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "socket_path must not be empty".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_frame_size must be greater than zero".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "read_buffer_size must be greater than zero".into(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "command_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default config file location
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("control-chain").join("listener.toml"))
}

/// Load configuration from the default location and the environment
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config() -> Result<ListenerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from `path` (if it exists) and the environment
///
/// # Errors
///
/// - `ConfigError::ReadError` if the file exists but cannot be read
/// - `ConfigError::ParseError` if it is not valid TOML
/// - `ConfigError::ValidationError` if the result is unusable
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ListenerConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_config_from_path`] with an explicit environment lookup
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ListenerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ListenerConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ListenerToml = toml::from_str(&toml_content)?;
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

fn apply_toml_config(config: &mut ListenerConfig, toml: &ListenerToml) {
    if let Some(ref path) = toml.daemon.socket_path {
        config.socket_path = PathBuf::from(path);
    }
    if let Some(size) = toml.daemon.max_frame_size {
        config.max_frame_size = size;
    }
    if let Some(size) = toml.daemon.read_buffer_size {
        config.read_buffer_size = size;
    }
    if let Some(ref ready_override) = toml.ready_override {
        config.ready_override = Some(ReadyOverride {
            marker: PathBuf::from(&ready_override.marker),
            device: PathBuf::from(&ready_override.device),
        });
    }
}

fn apply_env_config<F>(config: &mut ListenerConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env(ENV_SOCKET) {
        if !path.is_empty() {
            config.socket_path = PathBuf::from(path);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(size) = env(ENV_MAX_FRAME) {
        match size.parse::<usize>() {
            Ok(n) => {
                config.max_frame_size = n;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(value = %size, error = %e, "Ignoring {ENV_MAX_FRAME}"),
        }
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,

    /// Maximum frame size override
    pub max_frame_size: Option<usize>,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the socket path
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Override the maximum frame size
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    /// Apply on top of a loaded configuration
    pub fn apply(&self, config: &mut ListenerConfig) {
        if let Some(ref path) = self.socket_path {
            config.socket_path = path.clone();
            config.source = ConfigSource::Cli;
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = size;
            config.source = ConfigSource::Cli;
        }
    }
}
