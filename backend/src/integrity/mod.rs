//! Data integrity checks.
//!
//! Named SQL checks against the operational schema, run on demand and
//! cached so the HTTP layer can serve the latest results without
//! re-running the queries.

pub mod checks;

pub use checks::{default_checks, DataIntegrityCheck, Severity};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{EngineError, EngineResult, IntegrityRow, SqlEngine};

/// Count result of one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIntegritySummary {
    pub name: String,
    pub count: i64,
    pub finished: DateTime<Utc>,
}

/// Detailed result of one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIntegrityDetails {
    pub name: String,
    pub issues: Vec<IntegrityRow>,
    pub finished: DateTime<Utc>,
}

/// Runs integrity checks and caches their latest results.
pub struct DataIntegrityService {
    engine: Arc<dyn SqlEngine>,
    checks: Vec<DataIntegrityCheck>,
    summaries: RwLock<HashMap<String, DataIntegritySummary>>,
    details: RwLock<HashMap<String, DataIntegrityDetails>>,
}

impl DataIntegrityService {
    /// Service with the default check battery.
    pub fn new(engine: Arc<dyn SqlEngine>) -> Self {
        Self::with_checks(engine, default_checks())
    }

    pub fn with_checks(engine: Arc<dyn SqlEngine>, checks: Vec<DataIntegrityCheck>) -> Self {
        Self {
            engine,
            checks,
            summaries: RwLock::new(HashMap::new()),
            details: RwLock::new(HashMap::new()),
        }
    }

    /// All registered checks.
    pub fn checks(&self) -> &[DataIntegrityCheck] {
        &self.checks
    }

    /// Resolve check names, or all checks for an empty list. Unknown
    /// names fail with the full list of offenders.
    pub fn resolve(&self, names: &[String]) -> EngineResult<Vec<&DataIntegrityCheck>> {
        if names.is_empty() {
            return Ok(self.checks.iter().collect());
        }
        let unknown: Vec<&str> = names
            .iter()
            .filter(|n| !self.checks.iter().any(|c| &c.name == *n))
            .map(|n| n.as_str())
            .collect();
        if !unknown.is_empty() {
            return Err(EngineError::validation(format!(
                "Unknown data integrity checks: {}",
                unknown.join(", ")
            )));
        }
        Ok(self
            .checks
            .iter()
            .filter(|c| names.contains(&c.name))
            .collect())
    }

    /// Run summaries for the named checks and cache the results.
    pub async fn run_summaries(&self, names: &[String]) -> EngineResult<Vec<DataIntegritySummary>> {
        let checks = self.resolve(names)?;
        let mut results = vec![];
        for check in checks {
            log::debug!("Running integrity summary '{}'", check.name);
            let count = self.engine.query_count(&check.summary_sql).await?;
            let summary = DataIntegritySummary {
                name: check.name.clone(),
                count,
                finished: Utc::now(),
            };
            self.summaries
                .write()
                .insert(check.name.clone(), summary.clone());
            results.push(summary);
        }
        Ok(results)
    }

    /// Run details for the named checks and cache the results.
    pub async fn run_details(&self, names: &[String]) -> EngineResult<Vec<DataIntegrityDetails>> {
        let checks = self.resolve(names)?;
        let mut results = vec![];
        for check in checks {
            log::debug!("Running integrity details '{}'", check.name);
            let issues = self.engine.query_integrity_rows(&check.details_sql).await?;
            let details = DataIntegrityDetails {
                name: check.name.clone(),
                issues,
                finished: Utc::now(),
            };
            self.details
                .write()
                .insert(check.name.clone(), details.clone());
            results.push(details);
        }
        Ok(results)
    }

    /// Latest cached summaries, sorted by check name.
    pub fn cached_summaries(&self) -> Vec<DataIntegritySummary> {
        let mut summaries: Vec<_> = self.summaries.read().values().cloned().collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Latest cached details, sorted by check name.
    pub fn cached_details(&self) -> Vec<DataIntegrityDetails> {
        let mut details: Vec<_> = self.details.read().values().cloned().collect();
        details.sort_by(|a, b| a.name.cmp(&b.name));
        details
    }
}
