//! Engine factory for dependency injection.

use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "local-repo")]
use super::engines::LocalEngine;
#[cfg(feature = "postgres-repo")]
use super::engines::{PostgresConfig, PostgresEngine};
use super::{EngineError, EngineResult, SqlEngine};

/// Engine backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// Postgres + Diesel implementation
    Postgres,
    /// In-memory local engine
    Local,
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown engine type: {}", s)),
        }
    }
}

impl EngineType {
    /// Get engine type from environment.
    ///
    /// Reads `ENGINE_TYPE`; defaults to Postgres when a database URL is
    /// present, otherwise Local.
    pub fn from_env() -> Self {
        if let Ok(val) = std::env::var("ENGINE_TYPE") {
            return val.parse().unwrap_or(Self::Local);
        }

        if std::env::var("DATABASE_URL").is_ok() || std::env::var("PG_DATABASE_URL").is_ok() {
            Self::Postgres
        } else {
            Self::Local
        }
    }
}

/// Factory for creating engine instances.
pub struct EngineFactory;

impl EngineFactory {
    /// Create an engine of the given type.
    pub async fn create(engine_type: EngineType) -> EngineResult<Arc<dyn SqlEngine>> {
        match engine_type {
            EngineType::Postgres => Self::create_postgres().await,
            EngineType::Local => Self::create_local(),
        }
    }

    #[cfg(feature = "postgres-repo")]
    async fn create_postgres() -> EngineResult<Arc<dyn SqlEngine>> {
        let config = PostgresConfig::from_env().map_err(EngineError::configuration)?;
        let engine = PostgresEngine::new(config)?;
        engine.health_check().await?;
        Ok(Arc::new(engine))
    }

    #[cfg(not(feature = "postgres-repo"))]
    async fn create_postgres() -> EngineResult<Arc<dyn SqlEngine>> {
        Err(EngineError::configuration(
            "Postgres engine requested but the postgres-repo feature is not enabled",
        ))
    }

    #[cfg(feature = "local-repo")]
    fn create_local() -> EngineResult<Arc<dyn SqlEngine>> {
        Ok(Arc::new(LocalEngine::new()))
    }

    #[cfg(not(feature = "local-repo"))]
    fn create_local() -> EngineResult<Arc<dyn SqlEngine>> {
        Err(EngineError::configuration(
            "Local engine requested but the local-repo feature is not enabled",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_type_parses_known_names() {
        assert_eq!("postgres".parse::<EngineType>().unwrap(), EngineType::Postgres);
        assert_eq!("pg".parse::<EngineType>().unwrap(), EngineType::Postgres);
        assert_eq!("local".parse::<EngineType>().unwrap(), EngineType::Local);
        assert!("mysql".parse::<EngineType>().is_err());
    }

    #[cfg(feature = "local-repo")]
    #[tokio::test]
    async fn factory_creates_local_engine() {
        let engine = EngineFactory::create(EngineType::Local).await.unwrap();
        assert!(engine.health_check().await.unwrap());
    }
}
