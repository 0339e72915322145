//! SQL dialect abstraction.
//!
//! The analytics table builders emit all DDL and DML through a
//! [`SqlBuilder`] so the same table definitions render correctly against
//! PostgreSQL and Doris-style engines. Builders never branch on the
//! dialect themselves; anything dialect-specific lives behind this trait.

mod doris;
mod postgres;

pub use doris::DorisSqlBuilder;
pub use postgres::PostgresSqlBuilder;

use serde::{Deserialize, Serialize};

/// Abstract column data types mapped to concrete dialect types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDataType {
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Double,
    Boolean,
    /// Fixed 11-character identifier columns (uids).
    Character11,
    Varchar50,
    Varchar255,
    Text,
    Date,
    Timestamp,
    Geometry,
    Json,
}

/// Strategy object supplying dialect-specific SQL syntax.
///
/// One implementation per supported engine. Consumed by the DDL builder
/// and the table managers to produce dialect-correct statements.
pub trait SqlBuilder: Send + Sync {
    /// Short dialect name for logging.
    fn name(&self) -> &'static str;

    // ==================== Quoting ====================

    /// Quote a relation or column identifier, doubling embedded quotes.
    fn quote(&self, identifier: &str) -> String;

    /// Single-quote a literal value, doubling embedded single quotes.
    fn single_quote(&self, value: &str) -> String {
        format!("'{}'", self.escape(value))
    }

    /// Escape a literal value for inclusion between single quotes.
    fn escape(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    // ==================== Types and expressions ====================

    /// The concrete type name for an abstract column data type.
    fn data_type(&self, data_type: ColumnDataType) -> &'static str;

    /// Expression extracting `{key, value}` out of a JSON column.
    fn json_value(&self, column: &str, key: &str) -> String;

    /// Case-insensitive regular expression match expression.
    fn regexp_match(&self, value: &str, pattern: &str) -> String;

    /// Qualify an operational table name for cross-catalog access.
    fn qualify_table(&self, name: &str) -> String;

    // ==================== Capabilities ====================

    /// Whether per-year partition tables are supported.
    fn supports_table_partitions(&self) -> bool;

    /// Whether secondary indexes can be created after population.
    fn supports_indexes(&self) -> bool;

    /// Whether tables should be analyzed after population.
    fn requires_analyze(&self) -> bool;

    // ==================== DDL fragments ====================

    /// Storage options appended to CREATE TABLE, or empty.
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Clause attaching a partition table to its parent, or `None` when
    /// the dialect has no partition inheritance.
    fn inherits_clause(&self, parent: &str) -> Option<String>;

    /// DROP TABLE IF EXISTS statement.
    fn drop_table_if_exists(&self, table: &str) -> String;

    /// ALTER TABLE RENAME statement.
    fn rename_table(&self, from: &str, to: &str) -> String;

    /// Statements re-parenting a partition from one master table to
    /// another, or `None` when the dialect has no partition inheritance.
    fn swap_inheritance(&self, partition: &str, from_parent: &str, to_parent: &str)
        -> Option<Vec<String>>;

    /// ANALYZE statement, or `None` when the dialect does not need it.
    fn analyze_table(&self, table: &str) -> Option<String>;
}
