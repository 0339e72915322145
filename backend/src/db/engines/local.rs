//! In-memory engine for unit testing and local development.
//!
//! Records every executed statement in an ordered journal and serves
//! scripted query results, letting tests assert on the exact SQL the
//! pipeline generates without a live database.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use super::super::{EngineResult, IntegrityRow, OwnershipRow, SqlEngine};

/// In-memory [`SqlEngine`] implementation.
#[derive(Default)]
pub struct LocalEngine {
    journal: RwLock<Vec<String>>,
    existing_tables: RwLock<HashSet<String>>,
    years: RwLock<Vec<i32>>,
    /// Scripted `has_rows` responses keyed by a substring of the query;
    /// queries matching no key answer `false`.
    has_rows_matches: RwLock<Vec<(String, bool)>>,
    /// Scripted counts keyed by a substring of the query.
    count_matches: RwLock<Vec<(String, i64)>>,
    /// Scripted integrity rows keyed by a substring of the query.
    integrity_matches: RwLock<HashMap<String, Vec<IntegrityRow>>>,
    /// Scripted ownership rows served to any `query_ownership_rows` call.
    ownership_rows: RwLock<Vec<OwnershipRow>>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Scripting ====================

    /// Script the years returned by any `query_years` call.
    pub fn script_years(&self, years: Vec<i32>) {
        *self.years.write() = years;
    }

    /// Script `has_rows` to answer `value` for queries containing `needle`.
    pub fn script_has_rows(&self, needle: impl Into<String>, value: bool) {
        self.has_rows_matches.write().push((needle.into(), value));
    }

    /// Script `query_count` to answer `count` for queries containing `needle`.
    pub fn script_count(&self, needle: impl Into<String>, count: i64) {
        self.count_matches.write().push((needle.into(), count));
    }

    /// Script integrity rows for queries containing `needle`.
    pub fn script_integrity_rows(&self, needle: impl Into<String>, rows: Vec<IntegrityRow>) {
        self.integrity_matches.write().insert(needle.into(), rows);
    }

    /// Script the rows returned by any `query_ownership_rows` call.
    pub fn script_ownership_rows(&self, rows: Vec<OwnershipRow>) {
        *self.ownership_rows.write() = rows;
    }

    /// Mark a table as existing.
    pub fn add_existing_table(&self, table: impl Into<String>) {
        self.existing_tables.write().insert(table.into());
    }

    // ==================== Inspection ====================

    /// All executed statements in execution order.
    pub fn journal(&self) -> Vec<String> {
        self.journal.read().clone()
    }

    /// Executed statements containing the given fragment.
    pub fn journal_matching(&self, fragment: &str) -> Vec<String> {
        self.journal
            .read()
            .iter()
            .filter(|sql| sql.contains(fragment))
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.journal.write().clear();
    }
}

#[async_trait]
impl SqlEngine for LocalEngine {
    async fn execute(&self, sql: &str) -> EngineResult<u64> {
        log::debug!("local engine execute: {}", sql);
        self.journal.write().push(sql.to_string());
        Ok(0)
    }

    async fn has_rows(&self, sql: &str) -> EngineResult<bool> {
        let matches = self.has_rows_matches.read();
        Ok(matches
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, value)| *value)
            .unwrap_or(false))
    }

    async fn query_count(&self, sql: &str) -> EngineResult<i64> {
        let matches = self.count_matches.read();
        Ok(matches
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, count)| *count)
            .unwrap_or(0))
    }

    async fn query_years(&self, _sql: &str) -> EngineResult<Vec<i32>> {
        Ok(self.years.read().clone())
    }

    async fn query_integrity_rows(&self, sql: &str) -> EngineResult<Vec<IntegrityRow>> {
        let matches = self.integrity_matches.read();
        Ok(matches
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn query_ownership_rows(&self, _sql: &str) -> EngineResult<Vec<OwnershipRow>> {
        Ok(self.ownership_rows.read().clone())
    }

    async fn table_exists(&self, table: &str) -> EngineResult<bool> {
        Ok(self.existing_tables.read().contains(table))
    }

    async fn health_check(&self) -> EngineResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn journal_preserves_order() {
        let engine = LocalEngine::new();
        engine.execute("create table a (x text);").await.unwrap();
        engine.execute("insert into a values ('1');").await.unwrap();

        let journal = engine.journal();
        assert_eq!(journal.len(), 2);
        assert!(journal[0].starts_with("create table"));
        assert!(journal[1].starts_with("insert into"));
    }

    #[tokio::test]
    async fn scripted_results_match_on_substring() {
        let engine = LocalEngine::new();
        engine.script_has_rows("from event", true);
        engine.script_count("dataelement", 7);
        engine.script_years(vec![2022, 2023]);

        assert!(engine.has_rows("select 1 from event limit 1").await.unwrap());
        assert!(!engine.has_rows("select 1 from enrollment").await.unwrap());
        assert_eq!(engine.query_count("select count(*) as count from dataelement").await.unwrap(), 7);
        assert_eq!(engine.query_years("any").await.unwrap(), vec![2022, 2023]);
    }

    #[tokio::test]
    async fn table_existence_is_scripted() {
        let engine = LocalEngine::new();
        engine.add_existing_table("analytics_event_prabcdefg01");
        assert!(engine.table_exists("analytics_event_prabcdefg01").await.unwrap());
        assert!(!engine.table_exists("analytics_enrollment").await.unwrap());
    }
}
