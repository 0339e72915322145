//! Metadata model for the analytics subsystem.
//!
//! These types stand in for the host application's persisted metadata
//! (programs, data elements, attributes, organisation unit structure).
//! The analytics table builders only ever read metadata, so the model is
//! deliberately plain data plus an in-memory [`MetadataRegistry`] that
//! hands out slices.

mod registry;
mod uid;
mod value_type;

pub use registry::MetadataRegistry;
pub use uid::{InvalidUid, Uid};
pub use value_type::ValueType;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a program tracks registered entities or standalone events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    /// Tracker program: events belong to enrollments of tracked entities.
    WithRegistration,
    /// Event program: standalone events without enrollment.
    WithoutRegistration,
}

/// A data element collected in a program stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataElement {
    pub uid: Uid,
    pub name: String,
    pub value_type: ValueType,
    pub created: Option<DateTime<Utc>>,
}

impl DataElement {
    pub fn new(uid: Uid, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            uid,
            name: name.into(),
            value_type,
            created: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// An attribute recorded against a tracked entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntityAttribute {
    pub uid: Uid,
    pub name: String,
    pub value_type: ValueType,
    pub created: Option<DateTime<Utc>>,
}

impl TrackedEntityAttribute {
    pub fn new(uid: Uid, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            uid,
            name: name.into(),
            value_type,
            created: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// A stage of a program, owning the data elements collected at that stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStage {
    pub uid: Uid,
    pub name: String,
    pub data_elements: Vec<DataElement>,
}

impl ProgramStage {
    pub fn new(uid: Uid, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            data_elements: vec![],
        }
    }

    pub fn with_data_elements(mut self, data_elements: Vec<DataElement>) -> Self {
        self.data_elements = data_elements;
        self
    }
}

/// A program: the unit of analytics table generation for event,
/// enrollment and ownership tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub uid: Uid,
    pub name: String,
    pub program_type: ProgramType,
    pub stages: Vec<ProgramStage>,
    /// Attributes captured at enrollment for registration programs.
    pub attributes: Vec<TrackedEntityAttribute>,
}

impl Program {
    pub fn new(uid: Uid, name: impl Into<String>, program_type: ProgramType) -> Self {
        Self {
            uid,
            name: name.into(),
            program_type,
            stages: vec![],
            attributes: vec![],
        }
    }

    pub fn with_stages(mut self, stages: Vec<ProgramStage>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<TrackedEntityAttribute>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether this is a tracker program with registration.
    pub fn is_registration(&self) -> bool {
        self.program_type == ProgramType::WithRegistration
    }

    /// All data elements across all stages, in stage order.
    pub fn data_elements(&self) -> impl Iterator<Item = &DataElement> {
        self.stages.iter().flat_map(|s| s.data_elements.iter())
    }
}

/// A type of tracked entity (person, case, ...) with its own attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntityType {
    pub uid: Uid,
    pub name: String,
    pub attributes: Vec<TrackedEntityAttribute>,
}

impl TrackedEntityType {
    pub fn new(uid: Uid, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            attributes: vec![],
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<TrackedEntityAttribute>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A level in the organisation unit hierarchy.
///
/// The `created` timestamp drives resource-column filtering: levels added
/// after the last resource table update are not yet present in the
/// organisation unit structure table and must be excluded from DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationUnitLevel {
    pub level: u32,
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

impl OrganisationUnitLevel {
    pub fn new(level: u32, name: impl Into<String>) -> Self {
        Self {
            level,
            name: name.into(),
            created: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// An organisation unit group set used as a dynamic dimension column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationUnitGroupSet {
    pub uid: Uid,
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

impl OrganisationUnitGroupSet {
    pub fn new(uid: Uid, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            created: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// The fixed catalogue of period types, lowest to highest frequency.
///
/// Each period type becomes a text column selected from the date period
/// structure resource table.
pub const PERIOD_TYPES: &[&str] = &[
    "daily",
    "weekly",
    "biweekly",
    "monthly",
    "bimonthly",
    "quarterly",
    "sixmonthly",
    "yearly",
    "financialapril",
    "financialjuly",
    "financialoct",
];
