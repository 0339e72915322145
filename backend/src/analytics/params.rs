//! Parameters for an analytics table update run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Uid;

/// Parameters controlling a single analytics table update run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsTableUpdateParams {
    /// Start time of the update process; doubles as the exclusive upper
    /// bound for data included in the run.
    pub start_time: DateTime<Utc>,
    /// Update only the "latest" partition with data changed since the
    /// last successful update.
    pub latest_update: bool,
    /// Restrict partitions to the last N years counting from today.
    pub last_years: Option<u32>,
    /// Programs to exclude from table generation.
    pub skip_programs: Vec<Uid>,
}

impl AnalyticsTableUpdateParams {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            latest_update: false,
            last_years: None,
            skip_programs: vec![],
        }
    }

    /// Parameters for a full update starting now.
    pub fn full() -> Self {
        Self::new(Utc::now())
    }

    /// Parameters for a latest-partition update starting now.
    pub fn latest() -> Self {
        Self {
            latest_update: true,
            ..Self::new(Utc::now())
        }
    }

    pub fn with_last_years(mut self, years: u32) -> Self {
        self.last_years = Some(years);
        self
    }

    pub fn with_skip_programs(mut self, skip: Vec<Uid>) -> Self {
        self.skip_programs = skip;
        self
    }

    /// Whether a partial (latest-only) update is requested.
    pub fn is_partial_update(&self) -> bool {
        self.latest_update
    }
}
