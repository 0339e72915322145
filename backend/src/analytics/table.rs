//! Analytics table and partition model.

use chrono::NaiveDate;

use super::column::{AnalyticsTableColumn, ColumnRole};
use crate::models::{Program, TrackedEntityType, Uid};

/// Year sentinel for the "latest" partition holding data newer than the
/// last full table update.
pub const LATEST_PARTITION_YEAR: i32 = 0;

/// The kinds of analytics tables the pipeline builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsTableType {
    Event,
    Enrollment,
    TrackedEntity,
    Ownership,
    ValidationResult,
    Completeness,
}

impl AnalyticsTableType {
    /// Base table name for this type.
    pub fn table_name(self) -> &'static str {
        match self {
            AnalyticsTableType::Event => "analytics_event",
            AnalyticsTableType::Enrollment => "analytics_enrollment",
            AnalyticsTableType::TrackedEntity => "analytics_te",
            AnalyticsTableType::Ownership => "analytics_ownership",
            AnalyticsTableType::ValidationResult => "analytics_validationresult",
            AnalyticsTableType::Completeness => "analytics_completeness",
        }
    }

    /// Whether the type supports the latest-partition fast path.
    pub fn has_latest_partition(self) -> bool {
        matches!(self, AnalyticsTableType::Event)
    }

    /// Whether the type is partitioned by year at all.
    pub fn is_partitioned(self) -> bool {
        matches!(
            self,
            AnalyticsTableType::Event
                | AnalyticsTableType::ValidationResult
                | AnalyticsTableType::Completeness
        )
    }
}

/// A yearly (or latest) partition of an analytics table.
#[derive(Debug, Clone)]
pub struct AnalyticsTablePartition {
    /// Calendar year, or [`LATEST_PARTITION_YEAR`] for the latest partition.
    pub year: i32,
    /// Inclusive lower bound of the partition's data.
    pub start_date: NaiveDate,
    /// Exclusive upper bound of the partition's data.
    pub end_date: NaiveDate,
    /// Live partition table name.
    name: String,
    /// Staging partition table name.
    staging_name: String,
}

impl AnalyticsTablePartition {
    pub fn is_latest(&self) -> bool {
        self.year == LATEST_PARTITION_YEAR
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn staging_name(&self) -> &str {
        &self.staging_name
    }
}

/// An analytics table: type, column set and partitions.
///
/// Tables for event, enrollment and ownership types are per-program;
/// tracked entity tables are per tracked entity type; validation result
/// and completeness tables are singletons.
#[derive(Debug, Clone)]
pub struct AnalyticsTable {
    table_type: AnalyticsTableType,
    columns: Vec<AnalyticsTableColumn>,
    program: Option<Program>,
    tracked_entity_type: Option<TrackedEntityType>,
    partitions: Vec<AnalyticsTablePartition>,
}

impl AnalyticsTable {
    pub fn new(table_type: AnalyticsTableType, columns: Vec<AnalyticsTableColumn>) -> Self {
        Self {
            table_type,
            columns,
            program: None,
            tracked_entity_type: None,
            partitions: vec![],
        }
    }

    pub fn for_program(
        table_type: AnalyticsTableType,
        columns: Vec<AnalyticsTableColumn>,
        program: Program,
    ) -> Self {
        Self {
            program: Some(program),
            ..Self::new(table_type, columns)
        }
    }

    pub fn for_tracked_entity_type(
        table_type: AnalyticsTableType,
        columns: Vec<AnalyticsTableColumn>,
        tracked_entity_type: TrackedEntityType,
    ) -> Self {
        Self {
            tracked_entity_type: Some(tracked_entity_type),
            ..Self::new(table_type, columns)
        }
    }

    pub fn table_type(&self) -> AnalyticsTableType {
        self.table_type
    }

    pub fn columns(&self) -> &[AnalyticsTableColumn] {
        &self.columns
    }

    pub fn dimension_columns(&self) -> impl Iterator<Item = &AnalyticsTableColumn> {
        self.columns.iter().filter(|c| c.role == ColumnRole::Dimension)
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn program_uid(&self) -> Option<&Uid> {
        self.program.as_ref().map(|p| &p.uid)
    }

    pub fn tracked_entity_type(&self) -> Option<&TrackedEntityType> {
        self.tracked_entity_type.as_ref()
    }

    /// Live master table name, e.g. `analytics_event_abcdefabcde`.
    pub fn name(&self) -> String {
        let base = self.table_type.table_name();
        if let Some(ref program) = self.program {
            format!("{}_{}", base, program.uid.to_table_suffix())
        } else if let Some(ref tet) = self.tracked_entity_type {
            format!("{}_{}", base, tet.uid.to_table_suffix())
        } else {
            base.to_string()
        }
    }

    /// Staging table name, dropped-and-renamed over the live table.
    pub fn staging_name(&self) -> String {
        format!("{}_temp", self.name())
    }

    /// Add a yearly partition.
    pub fn add_partition(&mut self, year: i32, start_date: NaiveDate, end_date: NaiveDate) {
        let suffix = if year == LATEST_PARTITION_YEAR {
            "latest".to_string()
        } else {
            year.to_string()
        };
        let name = format!("{}_{}", self.name(), suffix);
        let staging_name = format!("{}_{}", self.staging_name(), suffix);
        self.partitions.push(AnalyticsTablePartition {
            year,
            start_date,
            end_date,
            name,
            staging_name,
        });
        self.partitions.sort_by_key(|p| p.year);
    }

    pub fn partitions(&self) -> &[AnalyticsTablePartition] {
        &self.partitions
    }

    pub fn has_partitions(&self) -> bool {
        !self.partitions.is_empty()
    }

    /// The latest partition, when present.
    pub fn latest_partition(&self) -> Option<&AnalyticsTablePartition> {
        self.partitions.iter().find(|p| p.is_latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProgramType, Uid};
    use crate::sql::ColumnDataType;

    fn uid(s: &str) -> Uid {
        Uid::new(s).unwrap()
    }

    fn columns() -> Vec<AnalyticsTableColumn> {
        vec![AnalyticsTableColumn::new(
            "ou",
            ColumnDataType::Character11,
            "ou.uid",
        )]
    }

    #[test]
    fn program_table_names_include_uid_suffix() {
        let program = Program::new(uid("PrAbCdEfG01"), "Imm", ProgramType::WithRegistration);
        let table = AnalyticsTable::for_program(AnalyticsTableType::Event, columns(), program);

        assert_eq!(table.name(), "analytics_event_prabcdefg01");
        assert_eq!(table.staging_name(), "analytics_event_prabcdefg01_temp");
    }

    #[test]
    fn partitions_are_sorted_and_named() {
        let program = Program::new(uid("prabcdefg01"), "Imm", ProgramType::WithRegistration);
        let mut table = AnalyticsTable::for_program(AnalyticsTableType::Event, columns(), program);
        table.add_partition(
            2024,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );
        table.add_partition(
            2022,
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        );

        let years: Vec<i32> = table.partitions().iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2022, 2024]);
        assert_eq!(table.partitions()[0].name(), "analytics_event_prabcdefg01_2022");
        assert_eq!(
            table.partitions()[0].staging_name(),
            "analytics_event_prabcdefg01_temp_2022"
        );
    }

    #[test]
    fn latest_partition_uses_sentinel_year() {
        let mut table = AnalyticsTable::new(AnalyticsTableType::Event, columns());
        table.add_partition(
            LATEST_PARTITION_YEAR,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        );
        let latest = table.latest_partition().unwrap();
        assert!(latest.is_latest());
        assert_eq!(latest.name(), "analytics_event_latest");
    }

    #[test]
    fn singleton_table_has_plain_name() {
        let table = AnalyticsTable::new(AnalyticsTableType::ValidationResult, columns());
        assert_eq!(table.name(), "analytics_validationresult");
    }
}
