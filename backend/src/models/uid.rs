//! Stable 11-character identifiers for metadata objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of every metadata identifier.
pub const UID_LENGTH: usize = 11;

/// Error returned when parsing an invalid identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid uid '{value}': {reason}")]
pub struct InvalidUid {
    pub value: String,
    pub reason: &'static str,
}

/// An 11-character alphanumeric identifier starting with a letter.
///
/// Identifiers double as SQL column names for dynamic dimensions (data
/// elements, attributes, group sets), which is why the character set is
/// restricted at construction instead of at quoting time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Parse an identifier, validating length and character set.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidUid> {
        let value = value.into();

        if value.len() != UID_LENGTH {
            return Err(InvalidUid {
                value,
                reason: "must be exactly 11 characters",
            });
        }
        if !value.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return Err(InvalidUid {
                value,
                reason: "must start with a letter",
            });
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidUid {
                value,
                reason: "must be alphanumeric",
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used in analytics table names.
    pub fn to_table_suffix(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Uid {
    type Error = InvalidUid;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}
