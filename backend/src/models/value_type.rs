//! Value types for data elements and tracked entity attributes.

use serde::{Deserialize, Serialize};

/// The value type of a data element or attribute.
///
/// Drives the SQL column type and the select expression used when
/// extracting values out of the operational JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Number,
    UnitInterval,
    Percentage,
    Integer,
    IntegerPositive,
    IntegerNegative,
    IntegerZeroOrPositive,
    Boolean,
    TrueOnly,
    Date,
    DateTime,
    Time,
    Text,
    LongText,
    Letter,
    PhoneNumber,
    Email,
    Username,
    OrganisationUnit,
    Coordinate,
}

impl ValueType {
    /// Types stored as floating point numbers.
    pub fn is_decimal(self) -> bool {
        matches!(
            self,
            ValueType::Number | ValueType::UnitInterval | ValueType::Percentage
        )
    }

    /// Types stored as whole numbers.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ValueType::Integer
                | ValueType::IntegerPositive
                | ValueType::IntegerNegative
                | ValueType::IntegerZeroOrPositive
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_decimal() || self.is_integer()
    }

    /// Boolean-like types, stored as 1/0 in analytics tables.
    pub fn is_boolean(self) -> bool {
        matches!(self, ValueType::Boolean | ValueType::TrueOnly)
    }

    /// Date and timestamp types.
    pub fn is_date(self) -> bool {
        matches!(self, ValueType::Date | ValueType::DateTime)
    }

    /// Organisation unit references, stored as 11-character uids.
    pub fn is_organisation_unit(self) -> bool {
        self == ValueType::OrganisationUnit
    }

    /// Types that must never get an index: unbounded text blows up
    /// index size without helping the aggregate queries.
    pub fn skip_index(self) -> bool {
        matches!(self, ValueType::Text | ValueType::LongText)
    }
}
