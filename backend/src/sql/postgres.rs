//! PostgreSQL dialect.

use super::{ColumnDataType, SqlBuilder};

/// SQL builder for PostgreSQL.
///
/// Partition tables use inheritance so they can be swapped in under the
/// live master table without rewriting data. Staging tables disable
/// autovacuum since they are bulk-loaded once and then renamed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSqlBuilder;

impl PostgresSqlBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl SqlBuilder for PostgresSqlBuilder {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn data_type(&self, data_type: ColumnDataType) -> &'static str {
        match data_type {
            ColumnDataType::SmallInt => "smallint",
            ColumnDataType::Integer => "integer",
            ColumnDataType::BigInt => "bigint",
            ColumnDataType::Decimal => "numeric(18,6)",
            ColumnDataType::Double => "double precision",
            ColumnDataType::Boolean => "boolean",
            ColumnDataType::Character11 => "character(11)",
            ColumnDataType::Varchar50 => "varchar(50)",
            ColumnDataType::Varchar255 => "varchar(255)",
            ColumnDataType::Text => "text",
            ColumnDataType::Date => "date",
            ColumnDataType::Timestamp => "timestamp",
            ColumnDataType::Geometry => "geometry",
            ColumnDataType::Json => "jsonb",
        }
    }

    fn json_value(&self, column: &str, key: &str) -> String {
        format!("{} #>> '{{{},value}}'", column, key)
    }

    fn regexp_match(&self, value: &str, pattern: &str) -> String {
        format!("{} ~* '{}'", value, pattern)
    }

    fn qualify_table(&self, name: &str) -> String {
        self.quote(name)
    }

    fn supports_table_partitions(&self) -> bool {
        true
    }

    fn supports_indexes(&self) -> bool {
        true
    }

    fn requires_analyze(&self) -> bool {
        true
    }

    fn table_options(&self) -> &'static str {
        "with(autovacuum_enabled = false)"
    }

    fn inherits_clause(&self, parent: &str) -> Option<String> {
        Some(format!("inherits ({})", self.quote(parent)))
    }

    fn drop_table_if_exists(&self, table: &str) -> String {
        format!("drop table if exists {} cascade;", self.quote(table))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "alter table {} rename to {};",
            self.quote(from),
            self.quote(to)
        )
    }

    fn swap_inheritance(
        &self,
        partition: &str,
        from_parent: &str,
        to_parent: &str,
    ) -> Option<Vec<String>> {
        Some(vec![
            format!(
                "alter table {} inherit {};",
                self.quote(partition),
                self.quote(to_parent)
            ),
            format!(
                "alter table {} no inherit {};",
                self.quote(partition),
                self.quote(from_parent)
            ),
        ])
    }

    fn analyze_table(&self, table: &str) -> Option<String> {
        Some(format!("analyze {};", self.quote(table)))
    }
}
