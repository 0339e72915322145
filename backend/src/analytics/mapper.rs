//! Value type to SQL column mapping.
//!
//! Operational data values arrive as strings (JSON event payloads,
//! attribute value rows). The mapper picks the analytics column type for
//! each value type and wraps the raw expression in a cast guarded by a
//! regular expression, so malformed values become NULL instead of
//! aborting the populate statement.

use std::sync::Arc;

use crate::models::{DataElement, TrackedEntityAttribute, ValueType};
use crate::sql::{ColumnDataType, SqlBuilder};

use super::column::{AnalyticsTableColumn, IndexType};

/// Matches ISO dates with optional time and millisecond suffix.
pub const DATE_REGEXP: &str =
    r"^\d{4}-\d{2}-\d{2}(\s|T)?((\d{2}:)(\d{2}:)?(\d{2}))?(|.(\d{3})|.(\d{3})Z)?$";

/// Matches optionally signed integers and decimals.
pub const NUMERIC_REGEXP: &str = r"^(-?[0-9]+)(\.[0-9]+)?$";

/// Maps metadata value types onto analytics columns.
pub struct ColumnMapper {
    builder: Arc<dyn SqlBuilder>,
}

impl ColumnMapper {
    pub fn new(builder: Arc<dyn SqlBuilder>) -> Self {
        Self { builder }
    }

    /// The analytics column type for a value type.
    pub fn column_data_type(&self, value_type: ValueType) -> ColumnDataType {
        if value_type.is_decimal() {
            ColumnDataType::Double
        } else if value_type.is_integer() {
            ColumnDataType::BigInt
        } else if value_type.is_boolean() {
            ColumnDataType::Integer
        } else if value_type.is_date() {
            ColumnDataType::Timestamp
        } else if value_type.is_organisation_unit() {
            ColumnDataType::Character11
        } else {
            ColumnDataType::Text
        }
    }

    /// Select expression extracting a data element value out of the
    /// event JSON payload, guarded by type.
    pub fn data_element_select(&self, data_element: &DataElement) -> String {
        let raw = self
            .builder
            .json_value("ev.eventdatavalues", data_element.uid.as_str());
        self.guarded_cast(&raw, data_element.value_type)
    }

    /// Select expression for a tracked entity attribute value, read from
    /// the joined attribute-value alias.
    pub fn attribute_select(&self, attribute: &TrackedEntityAttribute) -> String {
        let raw = format!("{}.value", self.builder.quote(attribute.uid.as_str()));
        self.guarded_cast(&raw, attribute.value_type)
    }

    /// Column definition for a data element, with index hints applied.
    pub fn data_element_column(&self, data_element: &DataElement) -> AnalyticsTableColumn {
        let mut column = AnalyticsTableColumn::new(
            data_element.uid.as_str(),
            self.column_data_type(data_element.value_type),
            self.data_element_select(data_element),
        )
        .as_fact();
        if !data_element.value_type.skip_index() {
            column = column.indexed();
        }
        if let Some(created) = data_element.created {
            column = column.with_created(created);
        }
        column
    }

    /// Column definition for a tracked entity attribute.
    pub fn attribute_column(&self, attribute: &TrackedEntityAttribute) -> AnalyticsTableColumn {
        let mut column = AnalyticsTableColumn::new(
            attribute.uid.as_str(),
            self.column_data_type(attribute.value_type),
            self.attribute_select(attribute),
        );
        if !attribute.value_type.skip_index() {
            column = column.indexed();
        }
        if let Some(created) = attribute.created {
            column = column.with_created(created);
        }
        column
    }

    /// Index hint for a geometry column.
    pub fn geometry_index_type(&self) -> IndexType {
        IndexType::Gist
    }

    fn guarded_cast(&self, raw: &str, value_type: ValueType) -> String {
        if value_type.is_numeric() {
            let target = self.cast_type(value_type);
            format!(
                "case when {} then cast({} as {}) end",
                self.builder.regexp_match(raw, NUMERIC_REGEXP),
                raw,
                target
            )
        } else if value_type.is_boolean() {
            format!(
                "case when {raw} = 'true' then 1 when {raw} = 'false' then 0 end"
            )
        } else if value_type.is_date() {
            format!(
                "case when {} then cast({} as {}) end",
                self.builder.regexp_match(raw, DATE_REGEXP),
                raw,
                self.builder.data_type(ColumnDataType::Timestamp)
            )
        } else {
            raw.to_string()
        }
    }

    fn cast_type(&self, value_type: ValueType) -> &'static str {
        if value_type.is_integer() {
            self.builder.data_type(ColumnDataType::BigInt)
        } else {
            self.builder.data_type(ColumnDataType::Double)
        }
    }
}
