//! Table managers, one per analytics table type.
//!
//! A manager inspects the metadata registry and produces the table
//! definitions (column lists, partitions) plus the populate statements
//! for its table type. All DDL execution is shared: the
//! [`ManagerContext`] carries the engine, the dialect and the metadata
//! and implements the create/index/analyze/swap cycle the update
//! service drives.

pub mod completeness;
pub mod enrollment;
pub mod event;
pub mod ownership;
pub mod tracked_entity;
pub mod validation_result;

pub use completeness::CompletenessTableManager;
pub use enrollment::EnrollmentTableManager;
pub use event::EventTableManager;
pub use ownership::{OwnershipTableManager, OwnershipWriter};
pub use tracked_entity::TrackedEntityTableManager;
pub use validation_result::ValidationResultTableManager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{EngineResult, SqlEngine};
use crate::models::{MetadataRegistry, PERIOD_TYPES};
use crate::settings::SettingsService;
use crate::sql::{ColumnDataType, SqlBuilder};

use super::column::{AnalyticsIndex, AnalyticsTableColumn, IndexType};
use super::ddl::DdlBuilder;
use super::mapper::ColumnMapper;
use super::params::AnalyticsTableUpdateParams;
use super::table::{AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType};

/// Organisation unit structure resource table, alias `ous`.
pub const ORG_UNIT_STRUCTURE: &str = "analytics_rs_orgunitstructure";
/// Organisation unit group set structure resource table, alias `ougs`.
pub const ORG_UNIT_GROUP_SET_STRUCTURE: &str = "analytics_rs_organisationunitgroupsetstructure";
/// Date period structure resource table, alias `dps`.
pub const DATE_PERIOD_STRUCTURE: &str = "analytics_rs_dateperiodstructure";

/// Builds and populates tables for one analytics table type.
#[async_trait]
pub trait AnalyticsTableManager: Send + Sync {
    fn table_type(&self) -> AnalyticsTableType;

    /// Table definitions for a full update.
    async fn tables(&self, params: &AnalyticsTableUpdateParams) -> EngineResult<Vec<AnalyticsTable>>;

    /// Table definitions for a latest-partition update covering
    /// `[from, params.start_time)`. Empty for types without a latest
    /// partition.
    async fn tables_for_latest(
        &self,
        _params: &AnalyticsTableUpdateParams,
        _from: DateTime<Utc>,
    ) -> EngineResult<Vec<AnalyticsTable>> {
        Ok(vec![])
    }

    /// Whether source data changed in `[from, to)`. Drives skipping the
    /// latest-partition update when nothing moved.
    async fn has_updated_data(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> EngineResult<bool> {
        Ok(false)
    }

    /// Remove rows from the live tables that are about to be re-inserted
    /// by a latest-partition update.
    async fn remove_updated_data(&self, _tables: &[AnalyticsTable]) -> EngineResult<()> {
        Ok(())
    }

    /// Populate one partition of a table, or the whole table when
    /// `partition` is `None`.
    async fn populate(
        &self,
        table: &AnalyticsTable,
        partition: Option<&AnalyticsTablePartition>,
    ) -> EngineResult<()>;
}

/// Shared dependencies and DDL plumbing for all managers.
pub struct ManagerContext {
    registry: Arc<MetadataRegistry>,
    engine: Arc<dyn SqlEngine>,
    settings: Arc<SettingsService>,
    sql: Arc<dyn SqlBuilder>,
    ddl: DdlBuilder,
    mapper: ColumnMapper,
}

impl ManagerContext {
    pub fn new(
        registry: Arc<MetadataRegistry>,
        engine: Arc<dyn SqlEngine>,
        settings: Arc<SettingsService>,
        sql: Arc<dyn SqlBuilder>,
    ) -> Self {
        Self {
            registry,
            engine: engine.clone(),
            settings,
            ddl: DdlBuilder::new(sql.clone()),
            mapper: ColumnMapper::new(sql.clone()),
            sql,
        }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn SqlEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn sql(&self) -> &Arc<dyn SqlBuilder> {
        &self.sql
    }

    pub fn ddl(&self) -> &DdlBuilder {
        &self.ddl
    }

    pub fn mapper(&self) -> &ColumnMapper {
        &self.mapper
    }

    // ==================== Shared column sets ====================

    /// Organisation unit columns: uid, name, code, level, one uid column
    /// per hierarchy level and one per organisation unit group set.
    ///
    /// Select expressions assume the `ous` (org unit structure) and
    /// `ougs` (group set structure) resource table aliases.
    pub fn org_unit_columns(&self) -> Vec<AnalyticsTableColumn> {
        let mut columns = vec![
            AnalyticsTableColumn::new("ou", ColumnDataType::Character11, "ous.organisationunituid")
                .not_null()
                .indexed(),
            AnalyticsTableColumn::new("ouname", ColumnDataType::Text, "ous.name")
                .not_null()
                .as_fact(),
            AnalyticsTableColumn::new("oucode", ColumnDataType::Text, "ous.code").as_fact(),
            AnalyticsTableColumn::new("oulevel", ColumnDataType::Integer, "ous.level").as_fact(),
        ];

        for level in self.registry.org_unit_levels() {
            let name = format!("uidlevel{}", level.level);
            let mut column = AnalyticsTableColumn::new(
                name.clone(),
                ColumnDataType::Character11,
                format!("ous.{}", name),
            )
            .indexed();
            if let Some(created) = level.created {
                column = column.with_created(created);
            }
            columns.push(column);
        }

        for group_set in self.registry.org_unit_group_sets() {
            let mut column = AnalyticsTableColumn::new(
                group_set.uid.as_str(),
                ColumnDataType::Character11,
                format!("ougs.{}", self.sql.quote(group_set.uid.as_str())),
            )
            .indexed();
            if let Some(created) = group_set.created {
                column = column.with_created(created);
            }
            columns.push(column);
        }

        columns
    }

    /// One text column per period type, selected from the date period
    /// structure alias `dps`. The `yearly` column doubles as the
    /// partition column and is not null.
    pub fn period_columns(&self) -> Vec<AnalyticsTableColumn> {
        PERIOD_TYPES
            .iter()
            .map(|period_type| {
                let column = AnalyticsTableColumn::new(
                    *period_type,
                    ColumnDataType::Text,
                    format!("dps.{}", self.sql.quote(period_type)),
                );
                if *period_type == "yearly" {
                    column.not_null()
                } else {
                    column
                }
            })
            .collect()
    }

    /// Apply resource-column filtering against the last resource table
    /// update timestamp from settings.
    pub fn filter_columns(&self, columns: Vec<AnalyticsTableColumn>) -> Vec<AnalyticsTableColumn> {
        let last_update = self
            .settings
            .current()
            .last_successful_resource_tables_update;
        self.ddl.filter_columns(columns, last_update)
    }

    // ==================== DDL execution ====================

    /// Drop the staging master table and all staging partitions.
    pub async fn drop_staging(&self, table: &AnalyticsTable) -> EngineResult<()> {
        if self.sql.supports_table_partitions() {
            for partition in table.partitions() {
                self.engine
                    .execute(&self.sql.drop_table_if_exists(partition.staging_name()))
                    .await?;
            }
        }
        self.engine
            .execute(&self.sql.drop_table_if_exists(&table.staging_name()))
            .await?;
        Ok(())
    }

    /// Create the staging master table plus staging partitions where the
    /// dialect supports them.
    pub async fn create_staging(&self, table: &AnalyticsTable) -> EngineResult<()> {
        log::info!("Creating staging table {}", table.staging_name());
        self.engine.execute(&self.ddl.create_table(table)).await?;
        if self.sql.supports_table_partitions() {
            for partition in table.partitions() {
                self.engine
                    .execute(&self.ddl.create_partition(table, partition))
                    .await?;
            }
        }
        Ok(())
    }

    /// The staging relation a populate statement writes into.
    pub fn populate_target(
        &self,
        table: &AnalyticsTable,
        partition: Option<&AnalyticsTablePartition>,
    ) -> String {
        match partition {
            Some(p) if self.sql.supports_table_partitions() => p.staging_name().to_string(),
            _ => table.staging_name(),
        }
    }

    /// Render an INSERT/SELECT populate statement for the given columns.
    pub fn insert_select(
        &self,
        target: &str,
        columns: &[AnalyticsTableColumn],
        from_clause: &str,
    ) -> String {
        let names = columns
            .iter()
            .map(|c| self.sql.quote(&c.name))
            .collect::<Vec<_>>()
            .join(",");
        let selects = columns
            .iter()
            .map(|c| c.select_expression.clone())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "insert into {} ({}) select {} {};",
            self.sql.quote(target),
            names,
            selects,
            from_clause
        )
    }

    /// Index definitions for all indexed columns across the table's
    /// staging relations. Empty when the dialect has no index DDL.
    pub fn table_indexes(&self, table: &AnalyticsTable) -> Vec<AnalyticsIndex> {
        if !self.sql.supports_indexes() {
            return vec![];
        }
        let targets: Vec<String> =
            if self.sql.supports_table_partitions() && table.has_partitions() {
                table
                    .partitions()
                    .iter()
                    .map(|p| p.staging_name().to_string())
                    .collect()
            } else {
                vec![table.staging_name()]
            };

        let mut indexes = vec![];
        for target in targets {
            for column in table.columns().iter().filter(|c| c.indexed) {
                indexes.push(AnalyticsIndex::new(
                    target.clone(),
                    vec![column.name.clone()],
                    column.index_type,
                ));
            }
        }
        indexes
    }

    /// Create all indexes for a table.
    pub async fn create_indexes(&self, table: &AnalyticsTable) -> EngineResult<()> {
        let indexes = self.table_indexes(table);
        if indexes.is_empty() {
            return Ok(());
        }
        log::info!("Creating {} indexes for {}", indexes.len(), table.name());
        for index in &indexes {
            self.engine.execute(&self.ddl.create_index(index)).await?;
        }
        Ok(())
    }

    /// Analyze the staging relations where the dialect wants it.
    pub async fn analyze(&self, table: &AnalyticsTable) -> EngineResult<()> {
        if !self.sql.requires_analyze() {
            return Ok(());
        }
        if self.sql.supports_table_partitions() {
            for partition in table.partitions() {
                if let Some(sql) = self.sql.analyze_table(partition.staging_name()) {
                    self.engine.execute(&sql).await?;
                }
            }
        }
        if let Some(sql) = self.sql.analyze_table(&table.staging_name()) {
            self.engine.execute(&sql).await?;
        }
        Ok(())
    }

    /// Swap staging relations over the live ones.
    ///
    /// Full updates swap every partition and then the master table. A
    /// partial update against an existing live master swaps only the
    /// partitions and re-parents them onto the live master before
    /// dropping the staging master.
    pub async fn swap(&self, table: &AnalyticsTable, partial: bool) -> EngineResult<()> {
        let live_exists = self.engine.table_exists(&table.name()).await?;
        let skip_master = partial && live_exists;

        if self.sql.supports_table_partitions() {
            for partition in table.partitions() {
                self.swap_relation(partition.staging_name(), partition.name())
                    .await?;
            }
        }

        if skip_master {
            for partition in table.partitions() {
                if let Some(statements) = self.sql.swap_inheritance(
                    partition.name(),
                    &table.staging_name(),
                    &table.name(),
                ) {
                    for statement in statements {
                        self.engine.execute(&statement).await?;
                    }
                }
            }
            self.engine
                .execute(&self.sql.drop_table_if_exists(&table.staging_name()))
                .await?;
        } else {
            self.swap_relation(&table.staging_name(), &table.name())
                .await?;
        }

        log::info!("Swapped {} into place", table.name());
        Ok(())
    }

    async fn swap_relation(&self, from: &str, to: &str) -> EngineResult<()> {
        self.engine
            .execute(&self.sql.drop_table_if_exists(to))
            .await?;
        self.engine.execute(&self.sql.rename_table(from, to)).await?;
        Ok(())
    }

    // ==================== Query helpers ====================

    /// Years with data, according to the given distinct-year query,
    /// restricted to the last N years when requested.
    pub async fn data_years(
        &self,
        sql: &str,
        params: &AnalyticsTableUpdateParams,
    ) -> EngineResult<Vec<i32>> {
        let years = self.engine.query_years(sql).await?;
        Ok(super::partition::restrict_years(years, params.last_years))
    }

    /// Geometry index type shortcut.
    pub fn gist(&self) -> IndexType {
        self.mapper.geometry_index_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalEngine;
    use crate::models::{OrganisationUnitGroupSet, OrganisationUnitLevel, Uid};
    use crate::sql::PostgresSqlBuilder;
    use chrono::NaiveDate;

    fn context() -> ManagerContext {
        let registry = MetadataRegistry::new()
            .with_org_unit_levels(vec![
                OrganisationUnitLevel::new(1, "National"),
                OrganisationUnitLevel::new(2, "District"),
            ])
            .with_org_unit_group_sets(vec![OrganisationUnitGroupSet::new(
                Uid::new("gsabcdefg01").unwrap(),
                "Facility type",
            )]);
        ManagerContext::new(
            Arc::new(registry),
            Arc::new(LocalEngine::new()),
            Arc::new(SettingsService::new()),
            Arc::new(PostgresSqlBuilder::new()),
        )
    }

    #[test]
    fn org_unit_columns_cover_levels_and_group_sets() {
        let columns = context().org_unit_columns();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["ou", "ouname", "oucode", "oulevel", "uidlevel1", "uidlevel2", "gsabcdefg01"]
        );
    }

    #[test]
    fn period_columns_mark_yearly_not_null() {
        let columns = context().period_columns();
        let yearly = columns.iter().find(|c| c.name == "yearly").unwrap();
        assert_eq!(yearly.not_null, crate::analytics::column::ColumnNotNull::NotNull);
        assert_eq!(columns.len(), PERIOD_TYPES.len());
    }

    #[tokio::test]
    async fn swap_full_renames_partitions_then_master() {
        let engine = Arc::new(LocalEngine::new());
        let ctx = ManagerContext::new(
            Arc::new(MetadataRegistry::new()),
            engine.clone(),
            Arc::new(SettingsService::new()),
            Arc::new(PostgresSqlBuilder::new()),
        );

        let mut table = AnalyticsTable::new(
            AnalyticsTableType::ValidationResult,
            vec![AnalyticsTableColumn::new("vr", ColumnDataType::Character11, "x")],
        );
        table.add_partition(
            2023,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );

        ctx.swap(&table, false).await.unwrap();

        let journal = engine.journal();
        assert_eq!(journal.len(), 4);
        assert!(journal[0].contains("drop table if exists \"analytics_validationresult_2023\""));
        assert!(journal[1].contains(
            "rename to \"analytics_validationresult_2023\""
        ));
        assert!(journal[2].contains("drop table if exists \"analytics_validationresult\" cascade"));
        assert!(journal[3].contains("rename to \"analytics_validationresult\""));
    }

    #[tokio::test]
    async fn partial_swap_reparents_and_drops_staging_master() {
        let engine = Arc::new(LocalEngine::new());
        engine.add_existing_table("analytics_event");
        let ctx = ManagerContext::new(
            Arc::new(MetadataRegistry::new()),
            engine.clone(),
            Arc::new(SettingsService::new()),
            Arc::new(PostgresSqlBuilder::new()),
        );

        let mut table = AnalyticsTable::new(
            AnalyticsTableType::Event,
            vec![AnalyticsTableColumn::new("event", ColumnDataType::Character11, "x")],
        );
        table.add_partition(
            crate::analytics::table::LATEST_PARTITION_YEAR,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        );

        ctx.swap(&table, true).await.unwrap();

        let journal = engine.journal();
        // partition swap, two inheritance statements, staging master drop
        assert!(journal[0].contains("drop table if exists \"analytics_event_latest\""));
        assert!(journal[1].contains("rename to \"analytics_event_latest\""));
        assert!(journal[2].contains("inherit \"analytics_event\""));
        assert!(journal[3].contains("no inherit \"analytics_event_temp\""));
        assert!(journal[4].contains("drop table if exists \"analytics_event_temp\""));
        assert!(!journal.iter().any(|s| s.contains("rename to \"analytics_event\";")));
    }

    #[test]
    fn indexes_target_partitions() {
        let ctx = context();
        let mut table = AnalyticsTable::new(
            AnalyticsTableType::Event,
            vec![
                AnalyticsTableColumn::new("ou", ColumnDataType::Character11, "x").indexed(),
                AnalyticsTableColumn::new("value", ColumnDataType::Double, "x").as_fact(),
            ],
        );
        table.add_partition(
            2023,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        table.add_partition(
            2024,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );

        let indexes = ctx.table_indexes(&table);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].table, "analytics_event_temp_2023");
        assert_eq!(indexes[1].table, "analytics_event_temp_2024");
    }
}
