//! TOML-based engine configuration.
//!
//! Values are resolved in this order, later sources winning:
//! 1. Built-in defaults
//! 2. A `teamcal.toml` file (or an explicit path)
//! 3. The `TEAMCAL_DB` environment variable for the database path

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TeamcalError};
use crate::expander::DEFAULT_HORIZON_YEARS;

/// Environment variable overriding [`EngineConfig::database_path`].
pub const DATABASE_ENV: &str = "TEAMCAL_DB";

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "teamcal.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// How far an open-ended pattern is materialized.
    pub generation_horizon_years: u32,
    /// Conflict summaries included in a create response before truncation.
    pub max_conflict_details: usize,
    /// Buffer size of the change-notification channel.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("teamcal.db"),
            generation_horizon_years: DEFAULT_HORIZON_YEARS,
            max_conflict_details: 10,
            notification_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|e| TeamcalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or from `teamcal.toml` if it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    TeamcalError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml(&raw)?
            }
            None => match std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
                Ok(raw) => Self::from_toml(&raw)?,
                Err(_) => Self::default(),
            },
        };

        if let Ok(db) = std::env::var(DATABASE_ENV) {
            if !db.trim().is_empty() {
                config.database_path = PathBuf::from(db);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation_horizon_years == 0 {
            return Err(TeamcalError::Config(
                "generation_horizon_years must be at least 1".to_string(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(TeamcalError::Config(
                "notification_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
