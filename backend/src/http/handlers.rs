//! HTTP handlers for the REST API.
//!
//! Each handler delegates to the analytics or integrity service; the
//! long-running operations run as background jobs and return a job id.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;

use super::dto::{
    CheckInfoDto, ChecksQuery, HealthResponse, JobStatusResponse, StartJobResponse,
    UpdateTablesRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::analytics::AnalyticsTableUpdateParams;
use crate::integrity::{DataIntegrityDetails, DataIntegritySummary};
use crate::models::Uid;
use crate::services::{JobKind, JobStatus};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let engine = match state.engine.health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        engine,
    }))
}

// =============================================================================
// Data integrity
// =============================================================================

/// GET /v1/dataIntegrity
///
/// Metadata for the registered checks, optionally filtered by name.
pub async fn list_checks(
    State(state): State<AppState>,
    Query(query): Query<ChecksQuery>,
) -> HandlerResult<Vec<CheckInfoDto>> {
    let checks = state.integrity.resolve(&query.names())?;
    Ok(Json(checks.into_iter().map(CheckInfoDto::from).collect()))
}

/// POST /v1/dataIntegrity/summary
///
/// Start a background summary run. Returns 202 with a job id.
pub async fn start_summary_run(
    State(state): State<AppState>,
    Query(query): Query<ChecksQuery>,
) -> Result<(StatusCode, Json<StartJobResponse>), AppError> {
    let names = query.names();
    // Reject unknown names before accepting the job
    state.integrity.resolve(&names)?;

    let job_id = state.job_tracker.create_job(JobKind::DataIntegritySummary);
    let tracker = state.job_tracker.clone();
    let integrity = state.integrity.clone();
    let task_job_id = job_id.clone();

    tokio::spawn(async move {
        match integrity.run_summaries(&names).await {
            Ok(summaries) => tracker.complete_job(
                &task_job_id,
                serde_json::to_value(&summaries).ok(),
            ),
            Err(e) => tracker.fail_job(&task_job_id, e.to_string()),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            message: format!("Summary run started. Track progress at /v1/jobs/{}", job_id),
            job_id,
        }),
    ))
}

/// GET /v1/dataIntegrity/summary
///
/// Latest cached summaries.
pub async fn get_summaries(State(state): State<AppState>) -> HandlerResult<Vec<DataIntegritySummary>> {
    Ok(Json(state.integrity.cached_summaries()))
}

/// POST /v1/dataIntegrity/details
pub async fn start_details_run(
    State(state): State<AppState>,
    Query(query): Query<ChecksQuery>,
) -> Result<(StatusCode, Json<StartJobResponse>), AppError> {
    let names = query.names();
    state.integrity.resolve(&names)?;

    let job_id = state.job_tracker.create_job(JobKind::DataIntegrityDetails);
    let tracker = state.job_tracker.clone();
    let integrity = state.integrity.clone();
    let task_job_id = job_id.clone();

    tokio::spawn(async move {
        match integrity.run_details(&names).await {
            Ok(details) => tracker.complete_job(
                &task_job_id,
                serde_json::to_value(&details).ok(),
            ),
            Err(e) => tracker.fail_job(&task_job_id, e.to_string()),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            message: format!("Details run started. Track progress at /v1/jobs/{}", job_id),
            job_id,
        }),
    ))
}

/// GET /v1/dataIntegrity/details
pub async fn get_details(State(state): State<AppState>) -> HandlerResult<Vec<DataIntegrityDetails>> {
    Ok(Json(state.integrity.cached_details()))
}

// =============================================================================
// Analytics tables
// =============================================================================

/// POST /v1/analyticsTables
///
/// Start an analytics table update job. Returns 202 with a job id.
pub async fn update_tables(
    State(state): State<AppState>,
    Json(request): Json<UpdateTablesRequest>,
) -> Result<(StatusCode, Json<StartJobResponse>), AppError> {
    let skip_programs = request
        .skip_programs
        .iter()
        .map(|s| Uid::new(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut params = if request.latest {
        AnalyticsTableUpdateParams::latest()
    } else {
        AnalyticsTableUpdateParams::full()
    };
    if let Some(years) = request.last_years {
        params = params.with_last_years(years);
    }
    params = params.with_skip_programs(skip_programs);

    let job_id = state.job_tracker.create_job(JobKind::AnalyticsTableUpdate);
    let tracker = state.job_tracker.clone();
    let service = state.update_service.clone();
    let task_job_id = job_id.clone();

    tokio::spawn(async move {
        match service.update(&params, &tracker, &task_job_id).await {
            Ok(summary) => tracker.complete_job(
                &task_job_id,
                serde_json::to_value(&summary).ok(),
            ),
            Err(e) => tracker.fail_job(&task_job_id, e.to_string()),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartJobResponse {
            message: format!(
                "Analytics table update started. Track progress at /v1/jobs/{}/logs",
                job_id
            ),
            job_id,
        }),
    ))
}

// =============================================================================
// Async job management
// =============================================================================

/// GET /v1/jobs/{job_id}
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> HandlerResult<JobStatusResponse> {
    let job = state
        .job_tracker
        .get_job(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: format!("{:?}", job.status).to_lowercase(),
        logs: job.logs,
        result: job.result,
    }))
}

/// GET /v1/jobs/{job_id}/logs
///
/// Stream job logs via Server-Sent Events.
pub async fn stream_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if state.job_tracker.get_job(&job_id).is_none() {
        return Err(AppError::NotFound(format!("Job {} not found", job_id)));
    }

    let tracker = state.job_tracker.clone();
    let stream = async_stream::stream! {
        let mut last_log_count = 0;
        loop {
            let logs = tracker.get_logs(&job_id);
            for log in logs.iter().skip(last_log_count) {
                let event_data = serde_json::to_string(log).unwrap_or_default();
                yield Ok(Event::default().data(event_data));
            }
            last_log_count = logs.len();

            if let Some(job) = tracker.get_job(&job_id) {
                if job.status != JobStatus::Running {
                    let final_event = serde_json::json!({
                        "status": job.status,
                        "result": job.result,
                    });
                    yield Ok(Event::default()
                        .event("complete")
                        .data(serde_json::to_string(&final_event).unwrap_or_default()));
                    break;
                }
            } else {
                break;
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keep-alive"),
    ))
}
