//! Doris-style dialect.
//!
//! Doris reads the operational schema through an external JDBC catalog,
//! so operational table references are qualified with the catalog and
//! database name. Analytics tables are plain unpartitioned tables; the
//! engine has no inheritance, no secondary index DDL and no analyze.

use super::{ColumnDataType, SqlBuilder};

/// SQL builder for Doris-style engines.
#[derive(Debug, Clone)]
pub struct DorisSqlBuilder {
    /// External catalog holding the operational schema.
    catalog: String,
    /// Database name inside the catalog.
    database: String,
}

impl DorisSqlBuilder {
    pub fn new(catalog: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            database: database.into(),
        }
    }
}

impl Default for DorisSqlBuilder {
    fn default() -> Self {
        Self::new("pg_catalog", "public")
    }
}

impl SqlBuilder for DorisSqlBuilder {
    fn name(&self) -> &'static str {
        "doris"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn data_type(&self, data_type: ColumnDataType) -> &'static str {
        match data_type {
            ColumnDataType::SmallInt => "smallint",
            ColumnDataType::Integer => "int",
            ColumnDataType::BigInt => "bigint",
            ColumnDataType::Decimal => "decimal(18,6)",
            ColumnDataType::Double => "double",
            ColumnDataType::Boolean => "boolean",
            ColumnDataType::Character11 => "varchar(11)",
            ColumnDataType::Varchar50 => "varchar(50)",
            ColumnDataType::Varchar255 => "varchar(255)",
            ColumnDataType::Text => "string",
            ColumnDataType::Date => "date",
            ColumnDataType::Timestamp => "datetime",
            ColumnDataType::Geometry => "string",
            ColumnDataType::Json => "json",
        }
    }

    fn json_value(&self, column: &str, key: &str) -> String {
        format!(
            "json_unquote(json_extract({}, '$.{}.value'))",
            column, key
        )
    }

    fn regexp_match(&self, value: &str, pattern: &str) -> String {
        format!("{} regexp '{}'", value, pattern)
    }

    fn qualify_table(&self, name: &str) -> String {
        format!(
            "{}.{}.{}",
            self.quote(&self.catalog),
            self.quote(&self.database),
            self.quote(name)
        )
    }

    fn supports_table_partitions(&self) -> bool {
        false
    }

    fn supports_indexes(&self) -> bool {
        false
    }

    fn requires_analyze(&self) -> bool {
        false
    }

    fn inherits_clause(&self, _parent: &str) -> Option<String> {
        None
    }

    fn drop_table_if_exists(&self, table: &str) -> String {
        format!("drop table if exists {};", self.quote(table))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "alter table {} rename {};",
            self.quote(from),
            self.quote(to)
        )
    }

    fn swap_inheritance(
        &self,
        _partition: &str,
        _from_parent: &str,
        _to_parent: &str,
    ) -> Option<Vec<String>> {
        None
    }

    fn analyze_table(&self, _table: &str) -> Option<String> {
        None
    }
}
