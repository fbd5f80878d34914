//! Configuration module for modlog.
//!
//! Loads configuration from environment variables. Every variable is
//! optional; unset ones fall back to the defaults of [`AuditConfig`] and
//! [`SweeperConfig`].

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::AuditConfig;
use crate::sweeper::SweeperConfig;

pub const DATA_DIR_VAR: &str = "MODLOG_DATA_DIR";
pub const RETENTION_VAR: &str = "MODLOG_RETENTION_SECS";
pub const ATTACHMENT_MAX_BYTES_VAR: &str = "MODLOG_ATTACHMENT_MAX_BYTES";
pub const ATTACHMENT_TIMEOUT_VAR: &str = "MODLOG_ATTACHMENT_TIMEOUT_SECS";
pub const SWEEP_INTERVAL_VAR: &str = "MODLOG_SWEEP_INTERVAL_SECS";
pub const SWEEP_BATCH_VAR: &str = "MODLOG_SWEEP_BATCH";

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the engine file.
    pub data_dir: PathBuf,
    pub audit: AuditConfig,
    pub sweeper: SweeperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            audit: AuditConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the real environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|s| !s.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir.trim());
        }

        if let Some(secs) = parse::<u64>(&lookup, RETENTION_VAR)? {
            config.audit = config.audit.retention(positive_secs(RETENTION_VAR, secs)?);
        }
        if let Some(bytes) = parse::<u64>(&lookup, ATTACHMENT_MAX_BYTES_VAR)? {
            config.audit = config.audit.attachment_max_bytes(bytes);
        }
        if let Some(secs) = parse::<u64>(&lookup, ATTACHMENT_TIMEOUT_VAR)? {
            config.audit = config
                .audit
                .attachment_timeout(positive_secs(ATTACHMENT_TIMEOUT_VAR, secs)?);
        }

        if let Some(secs) = parse::<u64>(&lookup, SWEEP_INTERVAL_VAR)? {
            config.sweeper = config
                .sweeper
                .interval(positive_secs(SWEEP_INTERVAL_VAR, secs)?);
        }
        if let Some(batch) = parse::<usize>(&lookup, SWEEP_BATCH_VAR)? {
            if batch == 0 {
                return Err(invalid(SWEEP_BATCH_VAR, "0"));
            }
            config.sweeper = config.sweeper.batch_size(batch);
        }

        Ok(config)
    }

    /// Path of the engine file inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("audit.redb")
    }
}

fn invalid(var: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| invalid(var, &raw)),
    }
}

fn positive_secs(var: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(invalid(var, "0"));
    }
    Ok(Duration::from_secs(secs))
}
