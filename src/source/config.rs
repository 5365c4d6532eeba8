//! Stream configuration.
//!
//! Options mirror the public API surface: live streaming takes a read
//! timeout and an optional record directory, offline replay takes a
//! repeat count. Both can also be loaded from a TOML file and overridden
//! from the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options for live USB streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveOptions {
    /// Directory to record the raw chunk stream into, if any.
    pub record_dir: Option<PathBuf>,
    /// Bulk IN read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Emit thermal rasters even when rows are missing.
    pub allow_partial_thermal: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            record_dir: None,
            read_timeout_ms: 1000,
            allow_partial_thermal: false,
        }
    }
}

impl LiveOptions {
    /// Validates the option values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Options for offline replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineOptions {
    /// Pass count: 0 for a single pass, N for N passes, -1 for infinite.
    pub repeat: i32,
    /// Emit thermal rasters even when rows are missing.
    pub allow_partial_thermal: bool,
}

impl Default for OfflineOptions {
    fn default() -> Self {
        Self {
            repeat: 0,
            allow_partial_thermal: false,
        }
    }
}

impl OfflineOptions {
    /// Creates options replaying the capture `repeat` times.
    pub fn with_repeat(repeat: i32) -> Self {
        Self {
            repeat,
            ..Default::default()
        }
    }

    /// Validates the option values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeat < -1 {
            return Err(ConfigError::InvalidRepeat(self.repeat));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("read timeout must be nonzero")]
    InvalidTimeout,
    #[error("repeat count {0} is invalid (use N >= 0, or -1 for infinite)")]
    InvalidRepeat(i32),
    #[error("failed to read config file: {0}")]
    FileRead(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

/// Diagnostics output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { metrics_port: 0 }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub live: LiveOptions,
    #[serde(default)]
    pub offline: OfflineOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.live.validate()?;
        config.offline.validate()?;
        Ok(config)
    }
}
