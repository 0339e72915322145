//! Analytics table generation.
//!
//! Periodically rebuilds wide, denormalized analytics tables from the
//! operational event/enrollment/tracked-entity schema. Each table type
//! has a manager that inspects metadata and produces a column set with
//! SQL data types, select expressions and index hints; shared DDL
//! plumbing renders those definitions through the active SQL dialect and
//! the update service orchestrates the drop/create/populate/index/swap
//! cycle.

pub mod column;
pub mod ddl;
pub mod manager;
pub mod mapper;
pub mod params;
pub mod partition;
pub mod service;
pub mod table;

pub use column::{AnalyticsIndex, AnalyticsTableColumn, ColumnNotNull, ColumnRole, IndexType};
pub use manager::{AnalyticsTableManager, ManagerContext};
pub use params::AnalyticsTableUpdateParams;
pub use service::{AnalyticsTableUpdateService, AnalyticsTableUpdateSummary};
pub use table::{AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType};
