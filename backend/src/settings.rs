//! System settings for the analytics pipeline.
//!
//! Tracks the last-successful-update timestamps that drive the "latest
//! partition only" fast path and resource-column filtering. Settings are
//! held in memory behind a lock and optionally persisted to a TOML file
//! so they survive restarts.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persistent analytics settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSettings {
    /// Completion time of the last successful full analytics table update.
    pub last_successful_analytics_tables_update: Option<DateTime<Utc>>,
    /// Completion time of the last successful latest-partition update.
    pub last_successful_latest_partition_update: Option<DateTime<Utc>>,
    /// Completion time of the last successful resource table update.
    pub last_successful_resource_tables_update: Option<DateTime<Utc>>,
}

impl AnalyticsSettings {
    /// The most recent of the full and latest-partition update times.
    pub fn last_any_analytics_update(&self) -> Option<DateTime<Utc>> {
        match (
            self.last_successful_analytics_tables_update,
            self.last_successful_latest_partition_update,
        ) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Thread-safe settings service with optional file persistence.
pub struct SettingsService {
    settings: RwLock<AnalyticsSettings>,
    path: Option<PathBuf>,
}

impl SettingsService {
    /// Create an in-memory service with default settings.
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(AnalyticsSettings::default()),
            path: None,
        }
    }

    /// Create a service backed by a TOML file.
    ///
    /// A missing file yields default settings; it is created on the
    /// first write.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = fs::read_to_string(&path)
            .ok()
            .and_then(|content| toml::from_str(&content).ok())
            .unwrap_or_default();
        Self {
            settings: RwLock::new(settings),
            path: Some(path),
        }
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> AnalyticsSettings {
        self.settings.read().clone()
    }

    /// Record a completed full analytics table update.
    pub fn record_full_update(&self, time: DateTime<Utc>) {
        self.update(|s| s.last_successful_analytics_tables_update = Some(time));
    }

    /// Record a completed latest-partition update.
    pub fn record_latest_partition_update(&self, time: DateTime<Utc>) {
        self.update(|s| s.last_successful_latest_partition_update = Some(time));
    }

    /// Record a completed resource table update.
    pub fn record_resource_tables_update(&self, time: DateTime<Utc>) {
        self.update(|s| s.last_successful_resource_tables_update = Some(time));
    }

    fn update(&self, f: impl FnOnce(&mut AnalyticsSettings)) {
        let snapshot = {
            let mut settings = self.settings.write();
            f(&mut settings);
            settings.clone()
        };
        self.persist(&snapshot);
    }

    fn persist(&self, settings: &AnalyticsSettings) {
        let Some(ref path) = self.path else {
            return;
        };
        match toml::to_string_pretty(settings) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    log::warn!("Failed to persist settings to {}: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!("Failed to serialize settings: {}", e),
        }
    }
}

impl Default for SettingsService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn last_any_update_takes_latest() {
        let full = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let latest = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let settings = AnalyticsSettings {
            last_successful_analytics_tables_update: Some(full),
            last_successful_latest_partition_update: Some(latest),
            ..Default::default()
        };
        assert_eq!(settings.last_any_analytics_update(), Some(latest));

        let only_full = AnalyticsSettings {
            last_successful_analytics_tables_update: Some(full),
            ..Default::default()
        };
        assert_eq!(only_full.last_any_analytics_update(), Some(full));

        assert_eq!(AnalyticsSettings::default().last_any_analytics_update(), None);
    }

    #[test]
    fn record_updates_snapshot() {
        let service = SettingsService::new();
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        service.record_full_update(time);
        assert_eq!(
            service.current().last_successful_analytics_tables_update,
            Some(time)
        );
    }
}
