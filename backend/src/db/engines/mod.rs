//! Engine implementations.

#[cfg(feature = "local-repo")]
mod local;
#[cfg(feature = "postgres-repo")]
mod postgres;

#[cfg(feature = "local-repo")]
pub use local::LocalEngine;
#[cfg(feature = "postgres-repo")]
pub use postgres::{PoolStats, PostgresConfig, PostgresEngine};
