//! Mining session configuration.
//!
//! Supports TOML config files, environment variable overrides, and defaults.

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MinerError;

/// What the session boundary does with a fatal decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Log and terminate the process
    #[default]
    Abort,
    /// Return the error to the caller
    Propagate,
}

impl FromStr for FatalPolicy {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(FatalPolicy::Abort),
            "propagate" => Ok(FatalPolicy::Propagate),
            other => Err(MinerError::Config(format!("Invalid fatal_policy: {}", other))),
        }
    }
}

impl fmt::Display for FatalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalPolicy::Abort => write!(f, "abort"),
            FatalPolicy::Propagate => write!(f, "propagate"),
        }
    }
}

/// Mining session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Resolve row-chain fragments when a transaction commits (default: true)
    pub tidy_on_commit: bool,
    /// Keep committed transactions that produced no row change (default: false)
    pub keep_empty_transactions: bool,
    /// Reject commit flags outside the recognised set (default: true)
    pub strict_commit_flags: bool,
    /// Handling of fatal decode errors (default: abort)
    pub fatal_policy: FatalPolicy,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            tidy_on_commit: true,
            keep_empty_transactions: false,
            strict_commit_flags: true,
            fatal_policy: FatalPolicy::Abort,
        }
    }
}

impl MinerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MinerError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MinerError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, MinerError> {
        toml::from_str(toml_str).map_err(|e| MinerError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Saves the configuration to a TOML file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), MinerError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| MinerError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), toml)
            .map_err(|e| MinerError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Applies environment variable overrides.
    ///
    /// Variables are prefixed with `REDO_`, e.g. `REDO_FATAL_POLICY=propagate`.
    pub fn apply_env_overrides(&mut self) -> Result<(), MinerError> {
        if let Ok(val) = env::var("REDO_TIDY_ON_COMMIT") {
            self.tidy_on_commit = val
                .parse()
                .map_err(|_| MinerError::Config(format!("Invalid tidy_on_commit: {}", val)))?;
        }
        if let Ok(val) = env::var("REDO_KEEP_EMPTY_TRANSACTIONS") {
            self.keep_empty_transactions = val.parse().map_err(|_| {
                MinerError::Config(format!("Invalid keep_empty_transactions: {}", val))
            })?;
        }
        if let Ok(val) = env::var("REDO_STRICT_COMMIT_FLAGS") {
            self.strict_commit_flags = val.parse().map_err(|_| {
                MinerError::Config(format!("Invalid strict_commit_flags: {}", val))
            })?;
        }
        if let Ok(val) = env::var("REDO_FATAL_POLICY") {
            self.fatal_policy = val.parse()?;
        }
        Ok(())
    }

    /// Loads from an optional file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, MinerError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }
}
