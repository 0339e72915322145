//! HTTP layer tests exercising the handlers directly against the
//! in-memory engine.

#![cfg(feature = "http-server")]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use his_analytics::analytics::{AnalyticsTableUpdateService, ManagerContext};
use his_analytics::db::{LocalEngine, SqlEngine};
use his_analytics::http::dto::{ChecksQuery, UpdateTablesRequest};
use his_analytics::http::error::AppError;
use his_analytics::http::handlers;
use his_analytics::http::AppState;
use his_analytics::integrity::DataIntegrityService;
use his_analytics::models::{MetadataRegistry, Program, ProgramType, Uid};
use his_analytics::services::JobStatus;
use his_analytics::settings::SettingsService;
use his_analytics::sql::PostgresSqlBuilder;

fn state_with_engine(engine: Arc<LocalEngine>) -> AppState {
    let registry = MetadataRegistry::new().with_programs(vec![Program::new(
        Uid::new("prabcdefg01").unwrap(),
        "Events",
        ProgramType::WithoutRegistration,
    )]);
    let engine: Arc<dyn SqlEngine> = engine;
    let ctx = ManagerContext::new(
        Arc::new(registry),
        engine.clone(),
        Arc::new(SettingsService::new()),
        Arc::new(PostgresSqlBuilder::new()),
    );
    AppState::new(
        engine.clone(),
        Arc::new(AnalyticsTableUpdateService::new(Arc::new(ctx))),
        Arc::new(DataIntegrityService::new(engine)),
    )
}

fn state() -> AppState {
    state_with_engine(Arc::new(LocalEngine::new()))
}

/// Poll the tracker until the job leaves the running state.
async fn wait_for_job(state: &AppState, job_id: &str) -> JobStatus {
    for _ in 0..100 {
        if let Some(job) = state.job_tracker.get_job(job_id) {
            if job.status != JobStatus::Running {
                return job.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

#[tokio::test]
async fn health_reports_engine_status() {
    let Json(response) = handlers::health_check(State(state())).await.unwrap();
    assert_eq!(response.status, "ok");
    assert_eq!(response.engine, "connected");
}

#[tokio::test]
async fn check_listing_filters_by_name() {
    let state = state();

    let Json(all) = handlers::list_checks(State(state.clone()), Query(ChecksQuery::default()))
        .await
        .unwrap();
    assert!(all.len() >= 10);

    let Json(one) = handlers::list_checks(
        State(state.clone()),
        Query(ChecksQuery {
            checks: Some("indicators-without-groups".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].name, "indicators-without-groups");

    let err = handlers::list_checks(
        State(state),
        Query(ChecksQuery {
            checks: Some("no-such-check".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));
}

#[tokio::test]
async fn summary_run_completes_as_background_job() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_count("from indicator i", 3);
    let state = state_with_engine(engine);

    let (status, Json(response)) = handlers::start_summary_run(
        State(state.clone()),
        Query(ChecksQuery {
            checks: Some("indicators-without-groups".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_eq!(wait_for_job(&state, &response.job_id).await, JobStatus::Completed);

    let Json(summaries) = handlers::get_summaries(State(state)).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].count, 3);
}

#[tokio::test]
async fn summary_run_rejects_unknown_checks_up_front() {
    let err = handlers::start_summary_run(
        State(state()),
        Query(ChecksQuery {
            checks: Some("bogus".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));
}

#[tokio::test]
async fn table_update_runs_as_background_job() {
    let engine = Arc::new(LocalEngine::new());
    engine.script_years(vec![2023]);
    let state = state_with_engine(engine.clone());

    let (status, Json(response)) = handlers::update_tables(
        State(state.clone()),
        Json(UpdateTablesRequest::default()),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_eq!(wait_for_job(&state, &response.job_id).await, JobStatus::Completed);

    let job = state.job_tracker.get_job(&response.job_id).unwrap();
    let result = job.result.unwrap();
    assert_eq!(result["tables_updated"], 3);
    assert!(!engine.journal().is_empty());
}

#[tokio::test]
async fn table_update_rejects_invalid_skip_program_uids() {
    let err = handlers::update_tables(
        State(state()),
        Json(UpdateTablesRequest {
            skip_programs: vec!["not-a-uid".to_string()],
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn latest_update_without_prior_full_fails_the_job() {
    let state = state();

    let (_, Json(response)) = handlers::update_tables(
        State(state.clone()),
        Json(UpdateTablesRequest {
            latest: true,
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(wait_for_job(&state, &response.job_id).await, JobStatus::Failed);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let err = handlers::get_job_status(State(state()), Path("missing".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
