//! Postgres engine implementation using Diesel.
//!
//! Executes the generated analytics SQL against a live PostgreSQL
//! instance through an r2d2 connection pool, with automatic retry for
//! transient failures.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::{BigInt, Date, Integer, Nullable, Text};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use super::super::{EngineError, EngineResult, ErrorContext, IntegrityRow, OwnershipRow, SqlEngine};

type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let parse_u32 = |name: &str, default: u32| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(default)
        };
        let parse_u64 = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Ok(Self {
            database_url,
            max_pool_size: parse_u32("PG_POOL_MAX", 10),
            min_pool_size: parse_u32("PG_POOL_MIN", 1),
            connection_timeout_sec: parse_u64("PG_CONN_TIMEOUT_SEC", 30),
            idle_timeout_sec: parse_u64("PG_IDLE_TIMEOUT_SEC", 600),
            max_retries: parse_u32("PG_MAX_RETRIES", 3),
            retry_delay_ms: parse_u64("PG_RETRY_DELAY_MS", 100),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub connections_in_use: u32,
    pub idle_connections: u32,
    pub total_connections: u32,
    pub max_size: u32,
    pub total_queries: u64,
    pub failed_queries: u64,
    pub retried_operations: u64,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct YearRow {
    #[diesel(sql_type = Integer)]
    yr: i32,
}

#[derive(QueryableByName)]
struct DetailsRow {
    #[diesel(sql_type = Nullable<Text>)]
    id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    comment: Option<String>,
}

#[derive(QueryableByName)]
struct OwnershipQueryRow {
    #[diesel(sql_type = Text)]
    teuid: String,
    #[diesel(sql_type = Text)]
    ou: String,
    #[diesel(sql_type = Date)]
    startdate: chrono::NaiveDate,
}

#[derive(QueryableByName)]
struct ExistsRow {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    present: bool,
}

/// Diesel-backed engine for Postgres.
#[derive(Clone)]
pub struct PostgresEngine {
    pool: PgPool,
    config: PostgresConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
    retried_operations: Arc<AtomicU64>,
}

impl PostgresEngine {
    /// Create a new engine with a connection pool.
    pub fn new(config: PostgresConfig) -> EngineResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                EngineError::Connection {
                    message: e.to_string(),
                    context: ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size))
                        .retryable(),
                }
            })?;

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
            retried_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Execute a database operation with automatic retry for transient
    /// failures, off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> EngineResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = EngineError::Connection {
                            message: e.to_string(),
                            context: ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        };
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error
                .unwrap_or_else(|| EngineError::internal("Max retries exceeded with no error captured")))
        })
        .await
        .map_err(|e| EngineError::Internal {
            message: format!("Task join error: {}", e),
            context: ErrorContext::new("spawn_blocking"),
        })?
    }

    /// Get pool health statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SqlEngine for PostgresEngine {
    async fn execute(&self, sql: &str) -> EngineResult<u64> {
        let sql = sql.to_string();
        log::debug!("execute: {}", sql);
        self.with_conn(move |conn| {
            let affected = sql_query(&sql)
                .execute(conn)
                .map_err(EngineError::from)?;
            Ok(affected as u64)
        })
        .await
    }

    async fn has_rows(&self, sql: &str) -> EngineResult<bool> {
        let wrapped = format!("select exists ({}) as present", sql.trim_end_matches(';'));
        self.with_conn(move |conn| {
            let row: ExistsRow = sql_query(&wrapped).get_result(conn).map_err(EngineError::from)?;
            Ok(row.present)
        })
        .await
    }

    async fn query_count(&self, sql: &str) -> EngineResult<i64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let row: CountRow = sql_query(&sql).get_result(conn).map_err(EngineError::from)?;
            Ok(row.count)
        })
        .await
    }

    async fn query_years(&self, sql: &str) -> EngineResult<Vec<i32>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<YearRow> = sql_query(&sql).load(conn).map_err(EngineError::from)?;
            Ok(rows.into_iter().map(|r| r.yr).collect())
        })
        .await
    }

    async fn query_integrity_rows(&self, sql: &str) -> EngineResult<Vec<IntegrityRow>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<DetailsRow> = sql_query(&sql).load(conn).map_err(EngineError::from)?;
            Ok(rows
                .into_iter()
                .map(|r| IntegrityRow {
                    id: r.id,
                    name: r.name,
                    comment: r.comment,
                })
                .collect())
        })
        .await
    }

    async fn query_ownership_rows(&self, sql: &str) -> EngineResult<Vec<OwnershipRow>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<OwnershipQueryRow> =
                sql_query(&sql).load(conn).map_err(EngineError::from)?;
            Ok(rows
                .into_iter()
                .map(|r| OwnershipRow {
                    entity: r.teuid,
                    org_unit: r.ou,
                    start_date: r.startdate,
                })
                .collect())
        })
        .await
    }

    async fn table_exists(&self, table: &str) -> EngineResult<bool> {
        let sql = format!(
            "select exists (select 1 from information_schema.tables \
             where table_schema = 'public' and table_name = '{}') as present",
            table.replace('\'', "''")
        );
        self.with_conn(move |conn| {
            let row: ExistsRow = sql_query(&sql).get_result(conn).map_err(EngineError::from)?;
            Ok(row.present)
        })
        .await
    }

    async fn health_check(&self) -> EngineResult<bool> {
        self.with_conn(move |conn| {
            sql_query("select 1 as count").execute(conn).map_err(EngineError::from)?;
            Ok(true)
        })
        .await
    }
}
