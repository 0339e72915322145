//! In-memory metadata registry.
//!
//! The registry is the single read path the analytics table builders use
//! to discover programs, tracked entity types and organisation unit
//! structure. In the host application this data lives behind the ORM;
//! here it is loaded once at startup and shared immutably.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use super::{
    OrganisationUnitGroupSet, OrganisationUnitLevel, Program, TrackedEntityType, Uid,
};

/// On-disk metadata document the server loads at startup.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataDocument {
    programs: Vec<Program>,
    tracked_entity_types: Vec<TrackedEntityType>,
    org_unit_levels: Vec<OrganisationUnitLevel>,
    org_unit_group_sets: Vec<OrganisationUnitGroupSet>,
}

/// Immutable metadata snapshot used by the table builders.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    programs: Vec<Program>,
    tracked_entity_types: Vec<TrackedEntityType>,
    org_unit_levels: Vec<OrganisationUnitLevel>,
    org_unit_group_sets: Vec<OrganisationUnitGroupSet>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a metadata snapshot from a JSON document.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata file {}", path.display()))?;
        let doc: MetadataDocument = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse metadata file {}", path.display()))?;
        Ok(Self::new()
            .with_programs(doc.programs)
            .with_tracked_entity_types(doc.tracked_entity_types)
            .with_org_unit_levels(doc.org_unit_levels)
            .with_org_unit_group_sets(doc.org_unit_group_sets))
    }

    pub fn with_programs(mut self, programs: Vec<Program>) -> Self {
        self.programs = programs;
        self
    }

    pub fn with_tracked_entity_types(mut self, types: Vec<TrackedEntityType>) -> Self {
        self.tracked_entity_types = types;
        self
    }

    pub fn with_org_unit_levels(mut self, levels: Vec<OrganisationUnitLevel>) -> Self {
        self.org_unit_levels = levels;
        self.org_unit_levels.sort_by_key(|l| l.level);
        self
    }

    pub fn with_org_unit_group_sets(mut self, sets: Vec<OrganisationUnitGroupSet>) -> Self {
        self.org_unit_group_sets = sets;
        self
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// Programs minus an explicit skip list, preserving order.
    pub fn programs_excluding(&self, skip: &[Uid]) -> Vec<&Program> {
        self.programs
            .iter()
            .filter(|p| !skip.contains(&p.uid))
            .collect()
    }

    pub fn tracked_entity_types(&self) -> &[TrackedEntityType] {
        &self.tracked_entity_types
    }

    /// Organisation unit levels sorted ascending by level.
    pub fn org_unit_levels(&self) -> &[OrganisationUnitLevel] {
        &self.org_unit_levels
    }

    pub fn org_unit_group_sets(&self) -> &[OrganisationUnitGroupSet] {
        &self.org_unit_group_sets
    }
}
