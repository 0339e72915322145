//! SQL engine module.
//!
//! The analytics pipeline is SQL-string generation; this module is the
//! one place those strings get executed. The [`SqlEngine`] trait plays
//! the role a JDBC template plays in the original system, with two
//! implementations behind feature flags:
//!
//! - `engines::postgres`: Diesel + r2d2 connection pool (`postgres-repo`)
//! - `engines::local`: in-memory engine recording every statement in an
//!   ordered journal, with scripted query results (`local-repo`)
//!
//! The local engine is what the test suite asserts against: generated
//! DDL/DML is verified by inspecting the journal rather than a live
//! database.

// Feature flag priority: postgres > local
#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one engine backend feature.");

pub mod config;
pub mod error;
pub mod factory;
pub mod engines;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorContext};
pub use factory::{EngineFactory, EngineType};
#[cfg(feature = "local-repo")]
pub use engines::LocalEngine;
#[cfg(feature = "postgres-repo")]
pub use engines::{PoolStats, PostgresConfig, PostgresEngine};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};

/// A single row returned by a data integrity details query.
///
/// Details queries always project `uid as id, name, comment` so every
/// engine can deserialize them without schema knowledge.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IntegrityRow {
    pub id: Option<String>,
    pub name: Option<String>,
    pub comment: Option<String>,
}

/// A row of an ownership history query.
///
/// Ownership queries project `teuid, ou, startdate` ordered by entity
/// and start date; the ownership writer collapses them into ranges.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OwnershipRow {
    pub entity: String,
    pub org_unit: String,
    pub start_date: chrono::NaiveDate,
}

/// Abstract SQL execution engine.
///
/// All methods take finished SQL text; binding and dialect concerns are
/// handled upstream by the [`crate::sql::SqlBuilder`] strategies.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Execute a DDL/DML statement, returning the affected row count
    /// where the backend reports one.
    async fn execute(&self, sql: &str) -> EngineResult<u64>;

    /// Whether the given query returns at least one row.
    async fn has_rows(&self, sql: &str) -> EngineResult<bool>;

    /// Run a query projecting a single bigint `count` column.
    async fn query_count(&self, sql: &str) -> EngineResult<i64>;

    /// Run a query projecting a single integer `yr` column.
    async fn query_years(&self, sql: &str) -> EngineResult<Vec<i32>>;

    /// Run a data integrity details query projecting `id, name, comment`.
    async fn query_integrity_rows(&self, sql: &str) -> EngineResult<Vec<IntegrityRow>>;

    /// Run an ownership history query projecting `teuid, ou, startdate`.
    async fn query_ownership_rows(&self, sql: &str) -> EngineResult<Vec<OwnershipRow>>;

    /// Whether a table with the given name exists.
    async fn table_exists(&self, table: &str) -> EngineResult<bool>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> EngineResult<bool>;
}

/// Global engine instance initialized once per process.
static ENGINE: OnceLock<Arc<dyn SqlEngine>> = OnceLock::new();

/// Initialize the global engine singleton for the selected backend.
pub async fn init_engine() -> Result<()> {
    if ENGINE.get().is_some() {
        return Ok(());
    }

    let engine = EngineFactory::create(EngineType::from_env())
        .await
        .map_err(|e| anyhow::Error::msg(e.to_string()))?;
    let _ = ENGINE.set(engine);
    Ok(())
}

/// Get a reference to the global engine instance.
pub fn get_engine() -> Result<&'static Arc<dyn SqlEngine>> {
    ENGINE
        .get()
        .context("Engine not initialized. Call init_engine() first.")
}
