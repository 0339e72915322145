//! Engine configuration file support.
//!
//! Reads engine and dialect settings from a TOML configuration file, as
//! an alternative to environment variables for deployments that prefer
//! file-based configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::EngineError;

/// Engine configuration from file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub doris: DorisSettings,
}

/// Engine type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engine backend ("postgres" or "local")
    #[serde(rename = "type")]
    pub engine_type: String,
    /// SQL dialect used for generated statements ("postgresql" or "doris")
    #[serde(default = "default_dialect")]
    pub dialect: String,
}

fn default_dialect() -> String {
    "postgresql".to_string()
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSettings {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

/// Doris catalog settings used when the Doris dialect is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DorisSettings {
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for DorisSettings {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            database: default_database(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_catalog() -> String {
    "pg_catalog".to_string()
}

fn default_database() -> String {
    "public".to_string()
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            EngineError::configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}
