//! Analytics table update orchestration.
//!
//! Drives the full drop/create/populate/index/analyze/swap cycle across
//! all table managers, logging each phase to the job tracker. Latest
//! partition updates take a fast path that only rebuilds the latest
//! partition of table types supporting it, skipping tables whose source
//! data has not changed since the last successful run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{EngineError, EngineResult};
use crate::services::{JobTracker, LogLevel};

use super::manager::{
    AnalyticsTableManager, CompletenessTableManager, EnrollmentTableManager, EventTableManager,
    ManagerContext, OwnershipTableManager, TrackedEntityTableManager, ValidationResultTableManager,
};
use super::params::AnalyticsTableUpdateParams;
use super::table::AnalyticsTable;

/// Outcome of an analytics table update run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsTableUpdateSummary {
    pub tables_updated: usize,
    pub partitions_populated: usize,
    pub tables_skipped: usize,
    pub latest_update: bool,
}

pub struct AnalyticsTableUpdateService {
    ctx: Arc<ManagerContext>,
    managers: Vec<Arc<dyn AnalyticsTableManager>>,
}

impl AnalyticsTableUpdateService {
    /// Service with the full manager battery.
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        let managers: Vec<Arc<dyn AnalyticsTableManager>> = vec![
            Arc::new(EventTableManager::new(ctx.clone())),
            Arc::new(EnrollmentTableManager::new(ctx.clone())),
            Arc::new(TrackedEntityTableManager::new(ctx.clone())),
            Arc::new(OwnershipTableManager::new(ctx.clone())),
            Arc::new(ValidationResultTableManager::new(ctx.clone())),
            Arc::new(CompletenessTableManager::new(ctx.clone())),
        ];
        Self { ctx, managers }
    }

    /// Run an update, logging progress to the given job.
    pub async fn update(
        &self,
        params: &AnalyticsTableUpdateParams,
        tracker: &JobTracker,
        job_id: &str,
    ) -> EngineResult<AnalyticsTableUpdateSummary> {
        if params.is_partial_update() {
            self.update_latest(params, tracker, job_id).await
        } else {
            self.update_full(params, tracker, job_id).await
        }
    }

    async fn update_full(
        &self,
        params: &AnalyticsTableUpdateParams,
        tracker: &JobTracker,
        job_id: &str,
    ) -> EngineResult<AnalyticsTableUpdateSummary> {
        let mut summary = AnalyticsTableUpdateSummary::default();

        for manager in &self.managers {
            let tables = manager.tables(params).await?;
            self.log(
                tracker,
                job_id,
                format!("{:?}: {} tables", manager.table_type(), tables.len()),
            );
            for table in &tables {
                summary.partitions_populated += self
                    .process_table(manager.as_ref(), table, false)
                    .await?;
                summary.tables_updated += 1;
            }
        }

        self.ctx.settings().record_full_update(params.start_time);
        self.log(tracker, job_id, "Full analytics table update finished");
        Ok(summary)
    }

    async fn update_latest(
        &self,
        params: &AnalyticsTableUpdateParams,
        tracker: &JobTracker,
        job_id: &str,
    ) -> EngineResult<AnalyticsTableUpdateSummary> {
        let from = self
            .ctx
            .settings()
            .current()
            .last_any_analytics_update()
            .ok_or_else(|| {
                EngineError::validation(
                    "Latest partition update requires a previous full analytics table update",
                )
            })?;

        let mut summary = AnalyticsTableUpdateSummary {
            latest_update: true,
            ..Default::default()
        };

        for manager in &self.managers {
            if !manager.table_type().has_latest_partition() {
                continue;
            }
            if !manager.has_updated_data(from, params.start_time).await? {
                self.log(
                    tracker,
                    job_id,
                    format!("{:?}: no updated data, skipping", manager.table_type()),
                );
                summary.tables_skipped += 1;
                continue;
            }

            let tables = manager.tables_for_latest(params, from).await?;
            for table in &tables {
                summary.partitions_populated += self
                    .process_table(manager.as_ref(), table, true)
                    .await?;
                summary.tables_updated += 1;
            }
        }

        self.ctx
            .settings()
            .record_latest_partition_update(params.start_time);
        self.log(tracker, job_id, "Latest partition update finished");
        Ok(summary)
    }

    /// Process one table end to end. Returns the number of populate
    /// statements executed.
    async fn process_table(
        &self,
        manager: &dyn AnalyticsTableManager,
        table: &AnalyticsTable,
        partial: bool,
    ) -> EngineResult<usize> {
        self.ctx.ddl().validate_columns(table.columns())?;
        self.ctx.drop_staging(table).await?;
        self.ctx.create_staging(table).await?;

        let mut populated = 0;
        if table.has_partitions() {
            for partition in table.partitions() {
                manager.populate(table, Some(partition)).await?;
                populated += 1;
            }
        } else {
            manager.populate(table, None).await?;
            populated += 1;
        }

        if partial {
            manager
                .remove_updated_data(std::slice::from_ref(table))
                .await?;
        }

        self.ctx.create_indexes(table).await?;
        self.ctx.analyze(table).await?;
        self.ctx.swap(table, partial).await?;
        Ok(populated)
    }

    fn log(&self, tracker: &JobTracker, job_id: &str, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        tracker.log(job_id, LogLevel::Info, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalEngine;
    use crate::models::{MetadataRegistry, Program, ProgramType, Uid};
    use crate::services::JobKind;
    use crate::settings::SettingsService;
    use crate::sql::PostgresSqlBuilder;
    use chrono::Utc;

    fn uid(s: &str) -> Uid {
        Uid::new(s).unwrap()
    }

    fn service(engine: Arc<LocalEngine>, settings: Arc<SettingsService>) -> AnalyticsTableUpdateService {
        let registry = MetadataRegistry::new().with_programs(vec![Program::new(
            uid("prabcdefg01"),
            "Events only",
            ProgramType::WithoutRegistration,
        )]);
        AnalyticsTableUpdateService::new(Arc::new(ManagerContext::new(
            Arc::new(registry),
            engine,
            settings,
            Arc::new(PostgresSqlBuilder::new()),
        )))
    }

    fn job(tracker: &JobTracker) -> String {
        tracker.create_job(JobKind::AnalyticsTableUpdate)
    }

    #[tokio::test]
    async fn full_update_runs_all_phases_and_records_settings() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_years(vec![2023]);
        let settings = Arc::new(SettingsService::new());
        let service = service(engine.clone(), settings.clone());
        let tracker = JobTracker::new();

        let summary = service
            .update(&AnalyticsTableUpdateParams::full(), &tracker, &job(&tracker))
            .await
            .unwrap();

        // event table for the program plus the two singleton tables
        assert_eq!(summary.tables_updated, 3);
        assert!(summary.partitions_populated >= 3);
        assert!(!summary.latest_update);
        assert!(settings
            .current()
            .last_successful_analytics_tables_update
            .is_some());

        let journal = engine.journal();
        let creates = engine.journal_matching("create table");
        let inserts = engine.journal_matching("insert into");
        let renames = engine.journal_matching("rename to");
        assert!(!creates.is_empty());
        assert!(!inserts.is_empty());
        assert!(!renames.is_empty());
        // staging is created before population, population before swap
        let first_create = journal.iter().position(|s| s.contains("create table")).unwrap();
        let first_insert = journal.iter().position(|s| s.contains("insert into")).unwrap();
        let first_rename = journal.iter().position(|s| s.contains("rename to")).unwrap();
        assert!(first_create < first_insert);
        assert!(first_insert < first_rename);
        // analyze runs on Postgres
        assert!(!engine.journal_matching("analyze").is_empty());
    }

    #[tokio::test]
    async fn latest_update_without_prior_full_update_fails() {
        let engine = Arc::new(LocalEngine::new());
        let service = service(engine, Arc::new(SettingsService::new()));
        let tracker = JobTracker::new();

        let err = service
            .update(&AnalyticsTableUpdateParams::latest(), &tracker, &job(&tracker))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn latest_update_skips_tables_without_changed_data() {
        let engine = Arc::new(LocalEngine::new());
        let settings = Arc::new(SettingsService::new());
        settings.record_full_update(Utc::now());
        let service = service(engine.clone(), settings.clone());
        let tracker = JobTracker::new();

        let summary = service
            .update(&AnalyticsTableUpdateParams::latest(), &tracker, &job(&tracker))
            .await
            .unwrap();

        assert!(summary.latest_update);
        assert_eq!(summary.tables_updated, 0);
        assert_eq!(summary.tables_skipped, 1);
        assert!(settings
            .current()
            .last_successful_latest_partition_update
            .is_some());
    }

    #[tokio::test]
    async fn latest_update_rebuilds_latest_partition_only() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_has_rows("ev.lastupdated >=", true);
        engine.add_existing_table("analytics_event_prabcdefg01");
        let settings = Arc::new(SettingsService::new());
        settings.record_full_update(Utc::now() - chrono::Duration::days(2));
        let service = service(engine.clone(), settings);
        let tracker = JobTracker::new();

        let summary = service
            .update(&AnalyticsTableUpdateParams::latest(), &tracker, &job(&tracker))
            .await
            .unwrap();

        assert_eq!(summary.tables_updated, 1);
        let journal = engine.journal();
        assert!(journal.iter().any(|s| s.contains("analytics_event_prabcdefg01_temp_latest")));
        // master table is preserved: latest partition is re-parented instead
        assert!(journal.iter().any(|s| s.contains("inherit \"analytics_event_prabcdefg01\"")));
        assert!(!journal
            .iter()
            .any(|s| s.contains("rename to \"analytics_event_prabcdefg01\";")));
        // updated rows removed from the live table before the swap
        assert!(journal.iter().any(|s| s.starts_with("delete from \"analytics_event_prabcdefg01\"")));
    }
}
