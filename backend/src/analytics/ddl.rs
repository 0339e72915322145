//! DDL rendering for analytics tables.
//!
//! Renders create-table, create-partition and create-index statements
//! through the active [`SqlBuilder`]. Column sets are validated before
//! any DDL is emitted; a duplicate or empty column definition aborts the
//! whole update rather than producing a broken table.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{EngineError, EngineResult, ErrorContext};
use crate::sql::SqlBuilder;

use super::column::{AnalyticsIndex, AnalyticsTableColumn, ColumnNotNull};
use super::table::{AnalyticsTable, AnalyticsTablePartition};

/// Text column yearly partitions carry their check constraint on.
pub const PARTITION_COLUMN: &str = "yearly";

/// Renders analytics DDL for one SQL dialect.
pub struct DdlBuilder {
    builder: Arc<dyn SqlBuilder>,
}

impl DdlBuilder {
    pub fn new(builder: Arc<dyn SqlBuilder>) -> Self {
        Self { builder }
    }

    pub fn sql(&self) -> &Arc<dyn SqlBuilder> {
        &self.builder
    }

    /// Reject column sets with duplicate names or empty definitions.
    pub fn validate_columns(&self, columns: &[AnalyticsTableColumn]) -> EngineResult<()> {
        if columns.is_empty() {
            return Err(EngineError::validation_with_context(
                "table has no columns",
                ErrorContext::new("validate_columns"),
            ));
        }
        let mut seen = HashSet::new();
        for column in columns {
            if column.name.trim().is_empty() {
                return Err(EngineError::validation_with_context(
                    "column with empty name",
                    ErrorContext::new("validate_columns"),
                ));
            }
            if column.select_expression.trim().is_empty() {
                return Err(EngineError::validation_with_context(
                    format!("column '{}' has empty select expression", column.name),
                    ErrorContext::new("validate_columns"),
                ));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(EngineError::validation_with_context(
                    format!("duplicate column '{}'", column.name),
                    ErrorContext::new("validate_columns"),
                ));
            }
        }
        Ok(())
    }

    /// Drop columns whose metadata was created after the last resource
    /// table update: their resource columns do not exist yet.
    pub fn filter_columns(
        &self,
        columns: Vec<AnalyticsTableColumn>,
        last_resource_update: Option<DateTime<Utc>>,
    ) -> Vec<AnalyticsTableColumn> {
        let Some(last_update) = last_resource_update else {
            return columns;
        };
        columns
            .into_iter()
            .filter(|c| match c.created {
                Some(created) => created <= last_update,
                None => true,
            })
            .collect()
    }

    /// CREATE TABLE for the staging master table.
    pub fn create_table(&self, table: &AnalyticsTable) -> String {
        self.create_relation(table.staging_name(), table.columns(), None)
    }

    /// CREATE TABLE for a staging partition, attached to the staging
    /// master with a yearly check constraint.
    pub fn create_partition(
        &self,
        table: &AnalyticsTable,
        partition: &AnalyticsTablePartition,
    ) -> String {
        let check = if partition.is_latest() {
            format!(
                "check ({} >= '{}' and {} < '{}')",
                self.builder.quote("lastupdated"),
                partition.start_date,
                self.builder.quote("lastupdated"),
                partition.end_date
            )
        } else {
            format!(
                "check ({} = '{}')",
                self.builder.quote(PARTITION_COLUMN),
                partition.year
            )
        };
        self.create_relation_with_parent(
            partition.staging_name().to_string(),
            table.columns(),
            Some(check),
            Some(&table.staging_name()),
        )
    }

    /// CREATE INDEX for one index definition.
    pub fn create_index(&self, index: &AnalyticsIndex) -> String {
        let columns = index
            .columns
            .iter()
            .map(|c| self.builder.quote(c))
            .collect::<Vec<_>>()
            .join(",");
        let using = index
            .index_type
            .using_keyword()
            .map(|kw| format!(" using {}", kw))
            .unwrap_or_default();
        format!(
            "create index {} on {}{} ({});",
            self.builder.quote(&index.name()),
            self.builder.quote(&index.table),
            using,
            columns
        )
    }

    fn create_relation(
        &self,
        name: String,
        columns: &[AnalyticsTableColumn],
        check: Option<String>,
    ) -> String {
        self.create_relation_with_parent(name, columns, check, None)
    }

    fn create_relation_with_parent(
        &self,
        name: String,
        columns: &[AnalyticsTableColumn],
        check: Option<String>,
        parent: Option<&str>,
    ) -> String {
        let mut definitions: Vec<String> = columns
            .iter()
            .map(|c| {
                let not_null = match c.not_null {
                    ColumnNotNull::NotNull => " not null",
                    ColumnNotNull::Null => " null",
                };
                format!(
                    "{} {}{}",
                    self.builder.quote(&c.name),
                    self.builder.data_type(c.data_type),
                    not_null
                )
            })
            .collect();
        if let Some(check) = check {
            definitions.push(check);
        }

        let mut sql = format!(
            "create table {} ({})",
            self.builder.quote(&name),
            definitions.join(", ")
        );
        if let Some(inherits) = parent.and_then(|p| self.builder.inherits_clause(p)) {
            sql.push(' ');
            sql.push_str(&inherits);
        }
        let options = self.builder.table_options();
        if !options.is_empty() {
            sql.push(' ');
            sql.push_str(options);
        }
        sql.push(';');
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::table::AnalyticsTableType;
    use crate::sql::{ColumnDataType, DorisSqlBuilder, PostgresSqlBuilder};
    use chrono::NaiveDate;

    fn pg() -> DdlBuilder {
        DdlBuilder::new(Arc::new(PostgresSqlBuilder::new()))
    }

    fn columns() -> Vec<AnalyticsTableColumn> {
        vec![
            AnalyticsTableColumn::new("event", ColumnDataType::Character11, "ev.uid").not_null(),
            AnalyticsTableColumn::new("yearly", ColumnDataType::Text, "dps.yearly").not_null(),
        ]
    }

    #[test]
    fn validation_rejects_duplicates() {
        let ddl = pg();
        let mut cols = columns();
        cols.push(AnalyticsTableColumn::new(
            "event",
            ColumnDataType::Text,
            "x",
        ));
        let err = ddl.validate_columns(&cols).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'event'"));
    }

    #[test]
    fn validation_rejects_empty_expression() {
        let ddl = pg();
        let cols = vec![AnalyticsTableColumn::new("ou", ColumnDataType::Text, " ")];
        assert!(ddl.validate_columns(&cols).is_err());
    }

    #[test]
    fn filter_drops_columns_newer_than_resource_update() {
        let ddl = pg();
        let cutoff = Utc::now();
        let old = AnalyticsTableColumn::new("a", ColumnDataType::Text, "x")
            .with_created(cutoff - chrono::Duration::days(1));
        let new = AnalyticsTableColumn::new("b", ColumnDataType::Text, "x")
            .with_created(cutoff + chrono::Duration::days(1));
        let undated = AnalyticsTableColumn::new("c", ColumnDataType::Text, "x");

        let kept = ddl.filter_columns(vec![old, new, undated], Some(cutoff));
        let names: Vec<&str> = kept.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn staging_table_has_autovacuum_off() {
        let ddl = pg();
        let table = AnalyticsTable::new(AnalyticsTableType::ValidationResult, columns());
        let sql = ddl.create_table(&table);
        assert_eq!(
            sql,
            "create table \"analytics_validationresult_temp\" (\"event\" character(11) not null, \
             \"yearly\" text not null) with(autovacuum_enabled = false);"
        );
    }

    #[test]
    fn partition_gets_yearly_check_and_inherits() {
        let ddl = pg();
        let mut table = AnalyticsTable::new(AnalyticsTableType::ValidationResult, columns());
        table.add_partition(
            2023,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        let sql = ddl.create_partition(&table, &table.partitions()[0]);
        assert!(sql.starts_with("create table \"analytics_validationresult_temp_2023\""));
        assert!(sql.contains("check (\"yearly\" = '2023')"));
        assert!(sql.contains("inherits (\"analytics_validationresult_temp\")"));
    }

    #[test]
    fn latest_partition_checks_lastupdated_range() {
        let ddl = pg();
        let mut table = AnalyticsTable::new(AnalyticsTableType::Event, columns());
        table.add_partition(
            super::super::table::LATEST_PARTITION_YEAR,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        );
        let sql = ddl.create_partition(&table, &table.partitions()[0]);
        assert!(sql.contains("\"lastupdated\" >= '2024-06-01'"));
        assert!(sql.contains("\"lastupdated\" < '2024-06-15'"));
    }

    #[test]
    fn doris_table_has_no_inherits_or_options() {
        let ddl = DdlBuilder::new(Arc::new(DorisSqlBuilder::default()));
        let table = AnalyticsTable::new(AnalyticsTableType::ValidationResult, columns());
        let sql = ddl.create_table(&table);
        assert_eq!(
            sql,
            "create table `analytics_validationresult_temp` (`event` varchar(11) not null, \
             `yearly` string not null);"
        );
    }

    #[test]
    fn index_sql_quotes_and_uses_method() {
        let ddl = pg();
        let index = AnalyticsIndex::new(
            "analytics_event_prabcdefg01_2023",
            vec!["ou".to_string()],
            crate::analytics::column::IndexType::Btree,
        );
        assert_eq!(
            ddl.create_index(&index),
            "create index \"in_ou_analytics_event_prabcdefg01_2023\" on \
             \"analytics_event_prabcdefg01_2023\" (\"ou\");"
        );

        let gist = AnalyticsIndex::new(
            "analytics_event_prabcdefg01_2023",
            vec!["geom".to_string()],
            crate::analytics::column::IndexType::Gist,
        );
        assert!(ddl.create_index(&gist).contains("using gist (\"geom\")"));
    }
}
