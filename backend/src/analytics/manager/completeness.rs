//! Completeness analytics table (singleton, yearly partitions).
//!
//! Built from complete data set registrations; the timely flag marks
//! registrations completed no later than the period end.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::EngineResult;
use crate::sql::ColumnDataType;

use super::super::column::AnalyticsTableColumn;
use super::super::params::AnalyticsTableUpdateParams;
use super::super::partition::{partition_end, partition_start};
use super::super::table::{AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType};
use super::{
    AnalyticsTableManager, ManagerContext, DATE_PERIOD_STRUCTURE, ORG_UNIT_GROUP_SET_STRUCTURE,
    ORG_UNIT_STRUCTURE,
};

pub struct CompletenessTableManager {
    ctx: Arc<ManagerContext>,
}

impl CompletenessTableManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn columns(&self) -> Vec<AnalyticsTableColumn> {
        let mut columns = vec![
            AnalyticsTableColumn::new("ds", ColumnDataType::Character11, "cdr.datasetuid")
                .not_null()
                .indexed(),
            AnalyticsTableColumn::new("ao", ColumnDataType::Character11, "cdr.attributeoptioncombouid")
                .indexed(),
            AnalyticsTableColumn::new(
                "timely",
                ColumnDataType::Integer,
                "case when cdr.date <= pe.enddate then 1 else 0 end",
            )
            .as_fact(),
            AnalyticsTableColumn::new("value", ColumnDataType::Timestamp, "cdr.date").as_fact(),
            AnalyticsTableColumn::new("storedby", ColumnDataType::Varchar255, "cdr.storedby")
                .as_fact(),
        ];

        columns.extend(self.ctx.org_unit_columns());
        columns.extend(self.ctx.period_columns());
        self.ctx.filter_columns(columns)
    }

    fn from_clause(&self, filter: &str) -> String {
        let sql = self.ctx.sql();
        format!(
            "from {} cdr \
             inner join {} pe on cdr.periodid = pe.periodid \
             inner join {} ous on cdr.organisationunitid = ous.organisationunitid \
             left join {} ougs on cdr.organisationunitid = ougs.organisationunitid \
             inner join {} dps on cast(pe.startdate as date) = dps.dateperiod \
             where cdr.date is not null{}",
            sql.qualify_table("completedatasetregistration"),
            sql.qualify_table("period"),
            sql.quote(ORG_UNIT_STRUCTURE),
            sql.quote(ORG_UNIT_GROUP_SET_STRUCTURE),
            sql.quote(DATE_PERIOD_STRUCTURE),
            filter
        )
    }

    fn years_query(&self) -> String {
        let sql = self.ctx.sql();
        format!(
            "select distinct cast(extract(year from pe.startdate) as integer) as yr \
             from {} cdr inner join {} pe on cdr.periodid = pe.periodid \
             where cdr.date is not null;",
            sql.qualify_table("completedatasetregistration"),
            sql.qualify_table("period"),
        )
    }
}

#[async_trait]
impl AnalyticsTableManager for CompletenessTableManager {
    fn table_type(&self) -> AnalyticsTableType {
        AnalyticsTableType::Completeness
    }

    async fn tables(&self, params: &AnalyticsTableUpdateParams) -> EngineResult<Vec<AnalyticsTable>> {
        let mut table = AnalyticsTable::new(AnalyticsTableType::Completeness, self.columns());
        let years = self.ctx.data_years(&self.years_query(), params).await?;
        if years.is_empty() {
            return Ok(vec![]);
        }
        for year in years {
            table.add_partition(year, partition_start(year), partition_end(year));
        }
        Ok(vec![table])
    }

    async fn populate(
        &self,
        table: &AnalyticsTable,
        partition: Option<&AnalyticsTablePartition>,
    ) -> EngineResult<()> {
        let filter = partition
            .map(|p| {
                format!(
                    " and pe.startdate >= '{}' and pe.startdate < '{}'",
                    p.start_date, p.end_date
                )
            })
            .unwrap_or_default();
        let target = self.ctx.populate_target(table, partition);
        let sql = self
            .ctx
            .insert_select(&target, table.columns(), &self.from_clause(&filter));
        self.ctx.engine().execute(&sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalEngine;
    use crate::models::MetadataRegistry;
    use crate::settings::SettingsService;
    use crate::sql::{DorisSqlBuilder, PostgresSqlBuilder};
    use crate::sql::SqlBuilder;

    fn manager_with(engine: Arc<LocalEngine>, sql: Arc<dyn SqlBuilder>) -> CompletenessTableManager {
        CompletenessTableManager::new(Arc::new(ManagerContext::new(
            Arc::new(MetadataRegistry::new()),
            engine,
            Arc::new(SettingsService::new()),
            sql,
        )))
    }

    #[tokio::test]
    async fn timely_flag_compares_against_period_end() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_years(vec![2023]);
        let manager = manager_with(engine.clone(), Arc::new(PostgresSqlBuilder::new()));

        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();
        manager
            .populate(&tables[0], Some(&tables[0].partitions()[0]))
            .await
            .unwrap();

        let sql = &engine.journal()[0];
        assert!(sql.contains("case when cdr.date <= pe.enddate then 1 else 0 end"));
        assert!(sql.contains("from \"completedatasetregistration\" cdr"));
    }

    #[tokio::test]
    async fn doris_populates_master_staging_with_year_filter() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_years(vec![2023]);
        let manager = manager_with(engine.clone(), Arc::new(DorisSqlBuilder::default()));

        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();
        manager
            .populate(&tables[0], Some(&tables[0].partitions()[0]))
            .await
            .unwrap();

        let sql = &engine.journal()[0];
        // no partition tables: the year filter lands in the master staging insert
        assert!(sql.starts_with("insert into `analytics_completeness_temp`"));
        assert!(sql.contains("pe.startdate >= '2023-01-01'"));
        assert!(sql.contains("`pg_catalog`.`public`.`completedatasetregistration`"));
    }
}
