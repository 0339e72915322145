//! Analytics table columns and indexes.

use chrono::{DateTime, Utc};

use crate::sql::ColumnDataType;

/// Whether a column carries a NOT NULL constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnNotNull {
    NotNull,
    Null,
}

/// Index access method hint for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Default b-tree index.
    Btree,
    /// GiST index for geometry columns.
    Gist,
}

impl IndexType {
    /// The `using` clause keyword, or `None` for the default method.
    pub fn using_keyword(self) -> Option<&'static str> {
        match self {
            IndexType::Btree => None,
            IndexType::Gist => Some("gist"),
        }
    }
}

/// Whether a column is a dimension (grouped/filtered on) or a fact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Dimension,
    Fact,
}

/// A column of an analytics table.
///
/// Carries everything the DDL builder and the populate statement need:
/// name, SQL data type, the select expression that produces the value
/// from the operational schema, and index hints.
#[derive(Debug, Clone)]
pub struct AnalyticsTableColumn {
    /// Unquoted column name.
    pub name: String,
    pub data_type: ColumnDataType,
    pub not_null: ColumnNotNull,
    /// Select expression in the populate statement.
    pub select_expression: String,
    pub role: ColumnRole,
    /// Whether the column should get an index after population.
    pub indexed: bool,
    pub index_type: IndexType,
    /// Creation time of the underlying metadata object, used to filter
    /// out columns newer than the last resource table update.
    pub created: Option<DateTime<Utc>>,
}

impl AnalyticsTableColumn {
    /// A nullable, unindexed dimension column.
    pub fn new(
        name: impl Into<String>,
        data_type: ColumnDataType,
        select_expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null: ColumnNotNull::Null,
            select_expression: select_expression.into(),
            role: ColumnRole::Dimension,
            indexed: false,
            index_type: IndexType::Btree,
            created: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = ColumnNotNull::NotNull;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn with_index_type(mut self, index_type: IndexType) -> Self {
        self.indexed = true;
        self.index_type = index_type;
        self
    }

    pub fn as_fact(mut self) -> Self {
        self.role = ColumnRole::Fact;
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// An index to create on a populated analytics table.
#[derive(Debug, Clone)]
pub struct AnalyticsIndex {
    /// Table the index belongs to.
    pub table: String,
    /// Unquoted column names.
    pub columns: Vec<String>,
    pub index_type: IndexType,
}

impl AnalyticsIndex {
    pub fn new(table: impl Into<String>, columns: Vec<String>, index_type: IndexType) -> Self {
        Self {
            table: table.into(),
            columns,
            index_type,
        }
    }

    /// Deterministic index name: `in_<columns>_<table>`, truncated to
    /// the common 63-character identifier limit.
    pub fn name(&self) -> String {
        let mut name = format!("in_{}_{}", self.columns.join("_"), self.table);
        name.truncate(63);
        name
    }
}
