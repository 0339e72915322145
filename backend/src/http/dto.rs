//! Request and response types for the REST API.

use serde::{Deserialize, Serialize};

use crate::integrity::{DataIntegrityCheck, Severity};
use crate::services::LogEntry;

/// GET /health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
}

/// Optional comma-separated check name filter.
#[derive(Debug, Default, Deserialize)]
pub struct ChecksQuery {
    pub checks: Option<String>,
}

impl ChecksQuery {
    /// The filter as a name list; empty means all checks.
    pub fn names(&self) -> Vec<String> {
        self.checks
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Check metadata returned by GET /v1/dataIntegrity.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckInfoDto {
    pub name: String,
    pub display_name: String,
    pub section: String,
    pub severity: Severity,
    pub description: String,
}

impl From<&DataIntegrityCheck> for CheckInfoDto {
    fn from(check: &DataIntegrityCheck) -> Self {
        Self {
            name: check.name.clone(),
            display_name: check.display_name.clone(),
            section: check.section.clone(),
            severity: check.severity,
            description: check.description.clone(),
        }
    }
}

/// POST /v1/analyticsTables request body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateTablesRequest {
    /// Rebuild only the latest partition.
    pub latest: bool,
    /// Restrict partitions to the last N years.
    pub last_years: Option<u32>,
    /// Program uids to skip.
    pub skip_programs: Vec<String>,
}

/// Accepted response for background jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobResponse {
    pub job_id: String,
    pub message: String,
}

/// GET /v1/jobs/{job_id} response.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub logs: Vec<LogEntry>,
    pub result: Option<serde_json::Value>,
}
