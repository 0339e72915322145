//! Ownership analytics tables and the ownership range writer.
//!
//! Ownership history arrives as a chronological stream of (entity, org
//! unit, start date) rows. The writer collapses consecutive rows per
//! entity sharing an org unit into minimal date ranges: an entity's
//! first range opens at 1000-01-01 and its last range closes at
//! 9999-12-31, so every date queries to exactly one owning org unit.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

use crate::db::{EngineError, EngineResult, ErrorContext, OwnershipRow, SqlEngine};
use crate::models::Program;
use crate::sql::{ColumnDataType, SqlBuilder};

use super::super::column::AnalyticsTableColumn;
use super::super::params::AnalyticsTableUpdateParams;
use super::super::table::{AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType};
use super::{AnalyticsTableManager, ManagerContext, ORG_UNIT_STRUCTURE};

/// Rows buffered before a multi-row INSERT is flushed.
const BATCH_SIZE: usize = 1000;

/// Open-ended range start for the first row of each entity.
fn range_open() -> NaiveDate {
    NaiveDate::from_ymd_opt(1000, 1, 1).expect("valid sentinel date")
}

/// Open-ended range end for the last row of each entity.
fn range_close() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).expect("valid sentinel date")
}

struct OpenRange {
    entity: String,
    org_unit: String,
    start_date: NaiveDate,
    /// Start date of the most recent input row, for ordering checks.
    last_input_start: NaiveDate,
}

/// Batch writer collapsing an ordered ownership stream into date ranges.
pub struct OwnershipWriter {
    engine: Arc<dyn SqlEngine>,
    sql: Arc<dyn SqlBuilder>,
    target: String,
    open: Option<OpenRange>,
    pending: Vec<(String, String, NaiveDate, NaiveDate)>,
    rows_written: u64,
}

impl OwnershipWriter {
    pub fn new(engine: Arc<dyn SqlEngine>, sql: Arc<dyn SqlBuilder>, target: impl Into<String>) -> Self {
        Self {
            engine,
            sql,
            target: target.into(),
            open: None,
            pending: vec![],
            rows_written: 0,
        }
    }

    /// Feed the next row of the stream. Rows must arrive ordered by
    /// entity, then start date.
    pub async fn write(&mut self, row: OwnershipRow) -> EngineResult<()> {
        match self.open.take() {
            None => {
                self.open = Some(OpenRange {
                    entity: row.entity,
                    org_unit: row.org_unit,
                    start_date: range_open(),
                    last_input_start: row.start_date,
                });
            }
            Some(open) if open.entity == row.entity => {
                if row.start_date < open.last_input_start {
                    return Err(EngineError::validation_with_context(
                        format!(
                            "ownership rows out of order for entity {}: {} after {}",
                            open.entity, row.start_date, open.last_input_start
                        ),
                        ErrorContext::new("ownership_write").with_entity(self.target.clone()),
                    ));
                }
                if open.org_unit == row.org_unit {
                    // Same owner, extend the open range.
                    self.open = Some(OpenRange {
                        last_input_start: row.start_date,
                        ..open
                    });
                } else {
                    let end = row.start_date - Duration::days(1);
                    self.close(open, end).await?;
                    self.open = Some(OpenRange {
                        entity: row.entity,
                        org_unit: row.org_unit,
                        start_date: row.start_date,
                        last_input_start: row.start_date,
                    });
                }
            }
            Some(open) => {
                self.close(open, range_close()).await?;
                self.open = Some(OpenRange {
                    entity: row.entity,
                    org_unit: row.org_unit,
                    start_date: range_open(),
                    last_input_start: row.start_date,
                });
            }
        }
        Ok(())
    }

    /// Finalize the trailing range and flush everything buffered.
    /// Returns the total number of rows written.
    pub async fn flush(mut self) -> EngineResult<u64> {
        if let Some(open) = self.open.take() {
            self.close(open, range_close()).await?;
        }
        self.flush_pending().await?;
        Ok(self.rows_written)
    }

    async fn close(&mut self, open: OpenRange, end_date: NaiveDate) -> EngineResult<()> {
        self.pending
            .push((open.entity, open.org_unit, open.start_date, end_date));
        if self.pending.len() >= BATCH_SIZE {
            self.flush_pending().await?;
        }
        Ok(())
    }

    async fn flush_pending(&mut self) -> EngineResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let values = self
            .pending
            .iter()
            .map(|(entity, org_unit, start, end)| {
                format!(
                    "({},{},'{}','{}')",
                    self.sql.single_quote(entity),
                    self.sql.single_quote(org_unit),
                    start,
                    end
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "insert into {} ({},{},{},{}) values {};",
            self.sql.quote(&self.target),
            self.sql.quote("teuid"),
            self.sql.quote("ou"),
            self.sql.quote("startdate"),
            self.sql.quote("enddate"),
            values
        );
        self.engine.execute(&sql).await?;
        self.rows_written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

pub struct OwnershipTableManager {
    ctx: Arc<ManagerContext>,
}

impl OwnershipTableManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn columns(&self) -> Vec<AnalyticsTableColumn> {
        vec![
            AnalyticsTableColumn::new("teuid", ColumnDataType::Character11, "te.uid")
                .not_null()
                .indexed(),
            AnalyticsTableColumn::new("ou", ColumnDataType::Character11, "ous.organisationunituid")
                .not_null()
                .indexed(),
            AnalyticsTableColumn::new("startdate", ColumnDataType::Date, "a.startdate").not_null(),
            AnalyticsTableColumn::new("enddate", ColumnDataType::Date, "a.enddate").not_null(),
        ]
    }

    /// Ownership history plus current owners, ordered for the writer.
    fn history_query(&self, program: &Program) -> String {
        let sql = self.ctx.sql();
        let branch = |source: &str, alias: &str| {
            format!(
                "select te.uid as teuid, ous.organisationunituid as ou, \
                 cast({alias}.startdate as date) as startdate \
                 from {} {alias} \
                 inner join {} te on {alias}.trackedentityid = te.trackedentityid \
                 inner join {} ous on {alias}.organisationunitid = ous.organisationunitid \
                 where {alias}.programuid = {}",
                sql.qualify_table(source),
                sql.qualify_table("trackedentity"),
                sql.quote(ORG_UNIT_STRUCTURE),
                sql.single_quote(program.uid.as_str()),
            )
        };
        format!(
            "select teuid, ou, startdate from ({} union all {}) ownership \
             order by teuid, startdate;",
            branch("programownershiphistory", "poh"),
            branch("trackedentityprogramowner", "po"),
        )
    }
}

#[async_trait]
impl AnalyticsTableManager for OwnershipTableManager {
    fn table_type(&self) -> AnalyticsTableType {
        AnalyticsTableType::Ownership
    }

    async fn tables(&self, params: &AnalyticsTableUpdateParams) -> EngineResult<Vec<AnalyticsTable>> {
        Ok(self
            .ctx
            .registry()
            .programs_excluding(&params.skip_programs)
            .into_iter()
            .filter(|p| p.is_registration())
            .map(|program| {
                AnalyticsTable::for_program(
                    AnalyticsTableType::Ownership,
                    self.columns(),
                    program.clone(),
                )
            })
            .collect())
    }

    async fn populate(
        &self,
        table: &AnalyticsTable,
        partition: Option<&AnalyticsTablePartition>,
    ) -> EngineResult<()> {
        let program = table
            .program()
            .ok_or_else(|| EngineError::internal("ownership table without a program"))?;
        let target = self.ctx.populate_target(table, partition);

        let rows = self
            .ctx
            .engine()
            .query_ownership_rows(&self.history_query(program))
            .await?;

        let mut writer = OwnershipWriter::new(
            self.ctx.engine().clone(),
            self.ctx.sql().clone(),
            target,
        );
        for row in rows {
            writer.write(row).await?;
        }
        let written = writer.flush().await?;
        log::info!("Wrote {} ownership ranges for {}", written, table.name());
        Ok(())
    }
}
