//! Validation result analytics table (singleton, yearly partitions).

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

pub struct ValidationResultTableManager {
    ctx: Arc<ManagerContext>,
}

impl ValidationResultTableManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn columns(&self) -> Vec<AnalyticsTableColumn> {
        let mut columns = vec![
            AnalyticsTableColumn::new("vr", ColumnDataType::Character11, "vrs.validationruleuid")
                .not_null()
                .indexed(),
            AnalyticsTableColumn::new("ao", ColumnDataType::Character11, "vrs.attributeoptioncombouid")
                .indexed(),
            AnalyticsTableColumn::new("pestartdate", ColumnDataType::Timestamp, "pe.startdate")
                .not_null(),
            AnalyticsTableColumn::new("peenddate", ColumnDataType::Timestamp, "pe.enddate"),
            AnalyticsTableColumn::new("created", ColumnDataType::Timestamp, "vrs.created"),
            AnalyticsTableColumn::new("leftsidevalue", ColumnDataType::Double, "vrs.leftsidevalue")
                .as_fact(),
            AnalyticsTableColumn::new("rightsidevalue", ColumnDataType::Double, "vrs.rightsidevalue")
                .as_fact(),
        ];

        columns.extend(self.ctx.org_unit_columns());
        columns.extend(self.ctx.period_columns());
        self.ctx.filter_columns(columns)
    }

    fn from_clause(&self, filter: &str) -> String {
        let sql = self.ctx.sql();
        format!(
            "from {} vrs \
             inner join {} pe on vrs.periodid = pe.periodid \
             inner join {} ous on vrs.organisationunitid = ous.organisationunitid \
             left join {} ougs on vrs.organisationunitid = ougs.organisationunitid \
             inner join {} dps on cast(pe.startdate as date) = dps.dateperiod \
             where pe.startdate is not null{}",
            sql.qualify_table("validationresult"),
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
             from {} vrs inner join {} pe on vrs.periodid = pe.periodid \
             where pe.startdate is not null;",
            sql.qualify_table("validationresult"),
            sql.qualify_table("period"),
        )
    }
}

#[async_trait]
impl AnalyticsTableManager for ValidationResultTableManager {
    fn table_type(&self) -> AnalyticsTableType {
        AnalyticsTableType::ValidationResult
    }

    async fn tables(&self, params: &AnalyticsTableUpdateParams) -> EngineResult<Vec<AnalyticsTable>> {
        let mut table = AnalyticsTable::new(AnalyticsTableType::ValidationResult, self.columns());
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
    use crate::sql::PostgresSqlBuilder;

    fn manager(engine: Arc<LocalEngine>) -> ValidationResultTableManager {
        ValidationResultTableManager::new(Arc::new(ManagerContext::new(
            Arc::new(MetadataRegistry::new()),
            engine,
            Arc::new(SettingsService::new()),
            Arc::new(PostgresSqlBuilder::new()),
        )))
    }

    #[tokio::test]
    async fn no_data_years_means_no_table() {
        let engine = Arc::new(LocalEngine::new());
        let manager = manager(engine);
        assert!(manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn singleton_table_partitioned_by_period_year() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_years(vec![2022, 2023]);
        let manager = manager(engine.clone());

        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name(), "analytics_validationresult");
        assert_eq!(tables[0].partitions().len(), 2);

        manager
            .populate(&tables[0], Some(&tables[0].partitions()[0]))
            .await
            .unwrap();
        let sql = &engine.journal()[0];
        assert!(sql.contains("from \"validationresult\" vrs"));
        assert!(sql.contains("pe.startdate >= '2022-01-01'"));
    }
}
