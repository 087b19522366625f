//! Engine configuration
//!
//! [`EngineConfig`] can be built in code, parsed from TOML or YAML, and then
//! adjusted from `PROCFLOW_*` environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `PROCFLOW_IMPLICIT_TERMINATION` | `implicit_termination` |
//! | `PROCFLOW_MAX_STEPS` | `max_steps_per_signal` |
//! | `PROCFLOW_JOIN_LOCK_MODE` | `default_join_lock_mode` |

use crate::error::{ProcessError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding [`EngineConfig::implicit_termination`]
pub const ENV_IMPLICIT_TERMINATION: &str = "PROCFLOW_IMPLICIT_TERMINATION";
/// Environment variable overriding [`EngineConfig::max_steps_per_signal`]
pub const ENV_MAX_STEPS: &str = "PROCFLOW_MAX_STEPS";
/// Environment variable overriding [`EngineConfig::default_join_lock_mode`]
pub const ENV_JOIN_LOCK_MODE: &str = "PROCFLOW_JOIN_LOCK_MODE";

/// Runtime policy shared by every instance created with the same services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// End a parent token once its last active child has ended
    #[serde(default)]
    pub implicit_termination: bool,

    /// Maximum number of transitions taken during one public call
    #[serde(default = "default_max_steps")]
    pub max_steps_per_signal: usize,

    /// Lock mode handed to [`InstanceLock`](crate::services::InstanceLock) by joins
    /// that do not configure their own
    #[serde(default = "default_join_lock_mode")]
    pub default_join_lock_mode: String,
}

fn default_max_steps() -> usize {
    10_000
}

fn default_join_lock_mode() -> String {
    "UPGRADE".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            implicit_termination: false,
            max_steps_per_signal: default_max_steps(),
            default_join_lock_mode: default_join_lock_mode(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.toml`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(ProcessError::configuration(format!(
                "Unsupported config file extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Apply `PROCFLOW_*` environment overrides
    ///
    /// Unset variables leave the field untouched; set but unparsable values
    /// are reported as configuration errors.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = get_env_bool(ENV_IMPLICIT_TERMINATION)? {
            self.implicit_termination = value;
        }
        if let Some(value) = get_env_parse::<usize>(ENV_MAX_STEPS)? {
            self.max_steps_per_signal = value;
        }
        if let Ok(value) = std::env::var(ENV_JOIN_LOCK_MODE) {
            self.default_join_lock_mode = value;
        }
        self.validate()?;
        Ok(self)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env_overrides()
    }

    fn validate(&self) -> Result<()> {
        if self.max_steps_per_signal == 0 {
            return Err(ProcessError::configuration(
                "max_steps_per_signal must be greater than zero",
            ));
        }
        if self.default_join_lock_mode.trim().is_empty() {
            return Err(ProcessError::configuration(
                "default_join_lock_mode must not be empty",
            ));
        }
        Ok(())
    }
}

fn get_env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|e| {
            ProcessError::configuration(format!(
                "Failed to parse environment variable '{}': {}",
                key, e
            ))
        }),
        Err(_) => Ok(None),
    }
}

fn get_env_bool(key: &str) -> Result<Option<bool>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ProcessError::configuration(format!(
            "Invalid boolean value for '{}': {}",
            key, value
        ))),
    }
}
