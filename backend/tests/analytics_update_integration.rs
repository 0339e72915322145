//! End-to-end analytics table update runs against the in-memory engine,
//! asserting on the generated SQL journal.

use std::sync::Arc;

use his_analytics::analytics::{
    AnalyticsTableUpdateParams, AnalyticsTableUpdateService, ManagerContext,
};
use his_analytics::db::LocalEngine;
use his_analytics::models::{
    DataElement, MetadataRegistry, OrganisationUnitGroupSet, OrganisationUnitLevel, Program,
    ProgramStage, ProgramType, TrackedEntityAttribute, TrackedEntityType, Uid, ValueType,
};
use his_analytics::services::{JobKind, JobTracker};
use his_analytics::settings::SettingsService;
use his_analytics::sql::{DorisSqlBuilder, PostgresSqlBuilder, SqlBuilder};

fn uid(s: &str) -> Uid {
    Uid::new(s).unwrap()
}

/// A tracker program, an event program and a tracked entity type, with
/// two hierarchy levels and one group set.
fn registry() -> MetadataRegistry {
    let tracker = Program::new(uid("prtracker01"), "Immunization", ProgramType::WithRegistration)
        .with_stages(vec![ProgramStage::new(uid("psabcdefg01"), "Visit")
            .with_data_elements(vec![
                DataElement::new(uid("deweight001"), "Weight", ValueType::Number),
                DataElement::new(uid("denotes0001"), "Notes", ValueType::LongText),
            ])])
        .with_attributes(vec![TrackedEntityAttribute::new(
            uid("atbirthdt01"),
            "Birth date",
            ValueType::Date,
        )]);
    let events = Program::new(uid("prevents001"), "Malaria cases", ProgramType::WithoutRegistration)
        .with_stages(vec![ProgramStage::new(uid("psabcdefg02"), "Case")
            .with_data_elements(vec![DataElement::new(
                uid("deconfirm01"),
                "Confirmed",
                ValueType::Boolean,
            )])]);

    MetadataRegistry::new()
        .with_programs(vec![tracker, events])
        .with_tracked_entity_types(vec![TrackedEntityType::new(uid("ttperson001"), "Person")
            .with_attributes(vec![TrackedEntityAttribute::new(
                uid("atlastname1"),
                "Last name",
                ValueType::Text,
            )])])
        .with_org_unit_levels(vec![
            OrganisationUnitLevel::new(1, "National"),
            OrganisationUnitLevel::new(2, "District"),
        ])
        .with_org_unit_group_sets(vec![OrganisationUnitGroupSet::new(
            uid("gsfacility1"),
            "Facility type",
        )])
}

fn service(engine: Arc<LocalEngine>, sql: Arc<dyn SqlBuilder>) -> AnalyticsTableUpdateService {
    AnalyticsTableUpdateService::new(Arc::new(ManagerContext::new(
        Arc::new(registry()),
        engine,
        Arc::new(SettingsService::new()),
        sql,
    )))
}

fn job(tracker: &JobTracker) -> String {
    tracker.create_job(JobKind::AnalyticsTableUpdate)
}

#[tokio::test]
async fn full_update_builds_all_table_families() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_years(vec![2022, 2023]);
    let service = service(engine.clone(), Arc::new(PostgresSqlBuilder::new()));
    let tracker = JobTracker::new();

    let summary = service
        .update(&AnalyticsTableUpdateParams::full(), &tracker, &job(&tracker))
        .await
        .unwrap();

    // 2 event + 1 enrollment + 1 tracked entity + 1 ownership + 2 singletons
    assert_eq!(summary.tables_updated, 7);
    assert!(!summary.latest_update);

    let creates = engine.journal_matching("create table");
    let families = [
        "analytics_event_prtracker01_temp",
        "analytics_event_prevents001_temp",
        "analytics_enrollment_prtracker01_temp",
        "analytics_te_ttperson001_temp",
        "analytics_ownership_prtracker01_temp",
        "analytics_validationresult_temp",
        "analytics_completeness_temp",
    ];
    for family in families {
        assert!(
            creates.iter().any(|s| s.contains(family)),
            "missing create for {}",
            family
        );
    }
    // No enrollment or ownership tables for the event-only program
    assert!(!creates.iter().any(|s| s.contains("analytics_enrollment_prevents001")));
    assert!(!creates.iter().any(|s| s.contains("analytics_ownership_prevents001")));
}

#[tokio::test]
async fn event_tables_carry_dynamic_columns_and_partitions() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_years(vec![2023]);
    let service = service(engine.clone(), Arc::new(PostgresSqlBuilder::new()));
    let tracker = JobTracker::new();

    service
        .update(&AnalyticsTableUpdateParams::full(), &tracker, &job(&tracker))
        .await
        .unwrap();

    let creates = engine.journal_matching("create table \"analytics_event_prtracker01_temp\"");
    assert_eq!(creates.len(), 1);
    let ddl = &creates[0];
    // data element, attribute, org unit and period columns all present
    assert!(ddl.contains("\"deweight001\" double precision"));
    assert!(ddl.contains("\"atbirthdt01\" timestamp"));
    assert!(ddl.contains("\"uidlevel2\" character(11)"));
    assert!(ddl.contains("\"gsfacility1\" character(11)"));
    assert!(ddl.contains("\"monthly\" text"));

    // yearly partition inherits the staging master and constrains the year
    let partitions =
        engine.journal_matching("create table \"analytics_event_prtracker01_temp_2023\"");
    assert_eq!(partitions.len(), 1);
    assert!(partitions[0].contains("check (\"yearly\" = '2023')"));
    assert!(partitions[0].contains("inherits (\"analytics_event_prtracker01_temp\")"));

    // populate targets the staging partition, guarded numeric cast included
    let inserts =
        engine.journal_matching("insert into \"analytics_event_prtracker01_temp_2023\"");
    assert_eq!(inserts.len(), 1);
    assert!(inserts[0].contains("eventdatavalues"));
    assert!(inserts[0].contains("en.programuid = 'prtracker01'"));
}

#[tokio::test]
async fn skip_programs_excludes_their_tables() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_years(vec![2023]);
    let service = service(engine.clone(), Arc::new(PostgresSqlBuilder::new()));
    let tracker = JobTracker::new();

    let params =
        AnalyticsTableUpdateParams::full().with_skip_programs(vec![uid("prtracker01")]);
    service.update(&params, &tracker, &job(&tracker)).await.unwrap();

    let journal = engine.journal();
    assert!(!journal.iter().any(|s| s.contains("analytics_event_prtracker01")));
    assert!(journal.iter().any(|s| s.contains("analytics_event_prevents001")));
    // tracked entity tables are not program-scoped and remain
    assert!(journal.iter().any(|s| s.contains("analytics_te_ttperson001")));
}

#[tokio::test]
async fn indexes_skip_unbounded_text_columns() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_years(vec![2023]);
    let service = service(engine.clone(), Arc::new(PostgresSqlBuilder::new()));
    let tracker = JobTracker::new();

    service
        .update(&AnalyticsTableUpdateParams::full(), &tracker, &job(&tracker))
        .await
        .unwrap();

    let indexes = engine.journal_matching("create index");
    assert!(indexes.iter().any(|s| s.contains("\"ou\"")));
    // long text data elements never get indexed
    assert!(!indexes.iter().any(|s| s.contains("\"denotes0001\"")));
}

#[tokio::test]
async fn doris_updates_write_master_staging_only() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_years(vec![2023]);
    let service = service(
        engine.clone(),
        Arc::new(DorisSqlBuilder::new("pg_catalog", "public")),
    );
    let tracker = JobTracker::new();

    service
        .update(&AnalyticsTableUpdateParams::full(), &tracker, &job(&tracker))
        .await
        .unwrap();

    let journal = engine.journal();
    // no partition tables, no indexes, no analyze
    assert!(!journal.iter().any(|s| s.contains("_temp_2023")));
    assert!(!journal.iter().any(|s| s.contains("create index")));
    assert!(!journal.iter().any(|s| s.starts_with("analyze")));
    // inserts go to the backtick-quoted staging master across catalogs
    assert!(journal
        .iter()
        .any(|s| s.starts_with("insert into `analytics_event_prtracker01_temp`")));
    assert!(journal
        .iter()
        .any(|s| s.contains("`pg_catalog`.`public`.`event`")));
}
