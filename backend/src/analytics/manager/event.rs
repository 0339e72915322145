//! Event analytics tables, one per program.
//!
//! The widest table type: fixed event columns, organisation unit
//! hierarchy and group set columns, period type columns, one column per
//! data element extracted from the event JSON payload and, for
//! registration programs, one column per program attribute. Partitioned
//! by the year of the occurred date, with a latest partition covering
//! data changed since the last successful update.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::db::{EngineError, EngineResult};
use crate::models::Program;
use crate::sql::ColumnDataType;

use super::super::column::AnalyticsTableColumn;
use super::super::params::AnalyticsTableUpdateParams;
use super::super::partition::{partition_end, partition_start};
use super::super::table::{
    AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType, LATEST_PARTITION_YEAR,
};
use super::{
    AnalyticsTableManager, ManagerContext, DATE_PERIOD_STRUCTURE, ORG_UNIT_GROUP_SET_STRUCTURE,
    ORG_UNIT_STRUCTURE,
};

pub struct EventTableManager {
    ctx: Arc<ManagerContext>,
}

impl EventTableManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn columns(&self, program: &Program) -> Vec<AnalyticsTableColumn> {
        let mut columns = vec![
            AnalyticsTableColumn::new("event", ColumnDataType::Character11, "ev.uid").not_null(),
            AnalyticsTableColumn::new("enrollment", ColumnDataType::Character11, "en.uid")
                .not_null(),
        ];
        if program.is_registration() {
            columns.push(AnalyticsTableColumn::new(
                "te",
                ColumnDataType::Character11,
                "te.uid",
            ));
        }
        columns.extend([
            AnalyticsTableColumn::new("ps", ColumnDataType::Character11, "ev.programstageuid")
                .not_null()
                .indexed(),
            AnalyticsTableColumn::new("ao", ColumnDataType::Character11, "ev.attributeoptioncombouid")
                .indexed(),
            AnalyticsTableColumn::new("enrollmentdate", ColumnDataType::Timestamp, "en.enrollmentdate"),
            AnalyticsTableColumn::new("occurreddate", ColumnDataType::Timestamp, "ev.occurreddate")
                .not_null(),
            AnalyticsTableColumn::new("scheduleddate", ColumnDataType::Timestamp, "ev.scheduleddate"),
            AnalyticsTableColumn::new("completeddate", ColumnDataType::Timestamp, "ev.completeddate"),
            AnalyticsTableColumn::new("created", ColumnDataType::Timestamp, "ev.created").as_fact(),
            AnalyticsTableColumn::new("lastupdated", ColumnDataType::Timestamp, "ev.lastupdated")
                .not_null(),
            AnalyticsTableColumn::new("storedby", ColumnDataType::Varchar255, "ev.storedby")
                .as_fact(),
            AnalyticsTableColumn::new("eventstatus", ColumnDataType::Varchar50, "ev.status")
                .indexed(),
            AnalyticsTableColumn::new("longitude", ColumnDataType::Double, "ev.longitude").as_fact(),
            AnalyticsTableColumn::new("latitude", ColumnDataType::Double, "ev.latitude").as_fact(),
        ]);

        columns.extend(self.ctx.org_unit_columns());
        columns.extend(self.ctx.period_columns());

        for data_element in program.data_elements() {
            columns.push(self.ctx.mapper().data_element_column(data_element));
        }
        if program.is_registration() {
            for attribute in &program.attributes {
                columns.push(self.ctx.mapper().attribute_column(attribute));
            }
        }

        self.ctx.filter_columns(columns)
    }

    fn from_clause(&self, program: &Program, filter: &str) -> String {
        let sql = self.ctx.sql();
        let mut clause = format!(
            "from {} ev \
             inner join {} en on ev.enrollmentid = en.enrollmentid \
             left join {} te on en.trackedentityid = te.trackedentityid \
             inner join {} ous on ev.organisationunitid = ous.organisationunitid \
             left join {} ougs on ev.organisationunitid = ougs.organisationunitid \
             inner join {} dps on cast(ev.occurreddate as date) = dps.dateperiod",
            sql.qualify_table("event"),
            sql.qualify_table("enrollment"),
            sql.qualify_table("trackedentity"),
            sql.quote(ORG_UNIT_STRUCTURE),
            sql.quote(ORG_UNIT_GROUP_SET_STRUCTURE),
            sql.quote(DATE_PERIOD_STRUCTURE),
        );
        if program.is_registration() {
            for attribute in &program.attributes {
                let alias = sql.quote(attribute.uid.as_str());
                clause.push_str(&format!(
                    " left join {} {} on {}.trackedentityid = en.trackedentityid \
                     and {}.trackedentityattributeuid = {}",
                    sql.qualify_table("trackedentityattributevalue"),
                    alias,
                    alias,
                    alias,
                    sql.single_quote(attribute.uid.as_str()),
                ));
            }
        }
        clause.push_str(&format!(
            " where en.programuid = {} and ev.occurreddate is not null \
             and ev.deleted = false{}",
            sql.single_quote(program.uid.as_str()),
            filter
        ));
        clause
    }

    fn years_query(&self, program: &Program, params: &AnalyticsTableUpdateParams) -> String {
        let sql = self.ctx.sql();
        format!(
            "select distinct cast(extract(year from ev.occurreddate) as integer) as yr \
             from {} ev inner join {} en on ev.enrollmentid = en.enrollmentid \
             where en.programuid = {} and ev.occurreddate is not null \
             and ev.deleted = false and ev.lastupdated < '{}';",
            sql.qualify_table("event"),
            sql.qualify_table("enrollment"),
            sql.single_quote(program.uid.as_str()),
            params.start_time.format("%Y-%m-%d %H:%M:%S"),
        )
    }

    fn partition_filter(&self, partition: &AnalyticsTablePartition) -> String {
        if partition.is_latest() {
            format!(
                " and ev.lastupdated >= '{}' and ev.lastupdated < '{}'",
                partition.start_date, partition.end_date
            )
        } else {
            format!(
                " and ev.occurreddate >= '{}' and ev.occurreddate < '{}'",
                partition.start_date, partition.end_date
            )
        }
    }
}

#[async_trait]
impl AnalyticsTableManager for EventTableManager {
    fn table_type(&self) -> AnalyticsTableType {
        AnalyticsTableType::Event
    }

    async fn tables(&self, params: &AnalyticsTableUpdateParams) -> EngineResult<Vec<AnalyticsTable>> {
        let mut tables = vec![];
        for program in self.ctx.registry().programs_excluding(&params.skip_programs) {
            let columns = self.columns(program);
            let mut table = AnalyticsTable::for_program(
                AnalyticsTableType::Event,
                columns,
                program.clone(),
            );
            let years = self
                .ctx
                .data_years(&self.years_query(program, params), params)
                .await?;
            for year in years {
                table.add_partition(year, partition_start(year), partition_end(year));
            }
            tables.push(table);
        }
        Ok(tables)
    }

    async fn tables_for_latest(
        &self,
        params: &AnalyticsTableUpdateParams,
        from: DateTime<Utc>,
    ) -> EngineResult<Vec<AnalyticsTable>> {
        // The window is widened to whole days; the overlap is harmless
        // because updated rows are removed from the live table first.
        let start = from.date_naive();
        let end = params.start_time.date_naive() + Duration::days(1);

        let mut tables = vec![];
        for program in self.ctx.registry().programs_excluding(&params.skip_programs) {
            let columns = self.columns(program);
            let mut table = AnalyticsTable::for_program(
                AnalyticsTableType::Event,
                columns,
                program.clone(),
            );
            table.add_partition(LATEST_PARTITION_YEAR, start, end);
            tables.push(table);
        }
        Ok(tables)
    }

    async fn has_updated_data(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let sql = format!(
            "select ev.uid from {} ev where ev.lastupdated >= '{}' and ev.lastupdated < '{}' limit 1",
            self.ctx.sql().qualify_table("event"),
            from.format("%Y-%m-%d %H:%M:%S"),
            to.format("%Y-%m-%d %H:%M:%S"),
        );
        self.ctx.engine().has_rows(&sql).await
    }

    async fn remove_updated_data(&self, tables: &[AnalyticsTable]) -> EngineResult<()> {
        for table in tables {
            let Some(latest) = table.latest_partition() else {
                continue;
            };
            if !self.ctx.engine().table_exists(&table.name()).await? {
                continue;
            }
            let sql = format!(
                "delete from {} where {} >= '{}' and {} < '{}';",
                self.ctx.sql().quote(&table.name()),
                self.ctx.sql().quote("lastupdated"),
                latest.start_date,
                self.ctx.sql().quote("lastupdated"),
                latest.end_date,
            );
            log::info!("Removing updated rows from {}", table.name());
            self.ctx.engine().execute(&sql).await?;
        }
        Ok(())
    }

    async fn populate(
        &self,
        table: &AnalyticsTable,
        partition: Option<&AnalyticsTablePartition>,
    ) -> EngineResult<()> {
        let program = table
            .program()
            .ok_or_else(|| EngineError::internal("event table without a program"))?;
        let filter = partition.map(|p| self.partition_filter(p)).unwrap_or_default();
        let from_clause = self.from_clause(program, &filter);
        let target = self.ctx.populate_target(table, partition);
        let sql = self.ctx.insert_select(&target, table.columns(), &from_clause);
        self.ctx.engine().execute(&sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalEngine;
    use crate::models::{
        DataElement, MetadataRegistry, OrganisationUnitLevel, ProgramStage, ProgramType,
        TrackedEntityAttribute, Uid, ValueType,
    };
    use crate::settings::SettingsService;
    use crate::sql::PostgresSqlBuilder;

    fn uid(s: &str) -> Uid {
        Uid::new(s).unwrap()
    }

    fn program() -> Program {
        Program::new(uid("prabcdefg01"), "Immunization", ProgramType::WithRegistration)
            .with_stages(vec![ProgramStage::new(uid("psabcdefg01"), "Visit")
                .with_data_elements(vec![
                    DataElement::new(uid("deabcdefg01"), "Weight", ValueType::Number),
                    DataElement::new(uid("deabcdefg02"), "Notes", ValueType::LongText),
                ])])
            .with_attributes(vec![TrackedEntityAttribute::new(
                uid("atabcdefg01"),
                "First name",
                ValueType::Text,
            )])
    }

    fn manager(engine: Arc<LocalEngine>) -> EventTableManager {
        let registry = MetadataRegistry::new()
            .with_programs(vec![program()])
            .with_org_unit_levels(vec![OrganisationUnitLevel::new(1, "National")]);
        EventTableManager::new(Arc::new(ManagerContext::new(
            Arc::new(registry),
            engine,
            Arc::new(SettingsService::new()),
            Arc::new(PostgresSqlBuilder::new()),
        )))
    }

    #[tokio::test]
    async fn tables_have_fixed_and_metadata_columns() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_years(vec![2023, 2024]);
        let manager = manager(engine);

        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.name(), "analytics_event_prabcdefg01");

        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"event"));
        assert!(names.contains(&"te"));
        assert!(names.contains(&"uidlevel1"));
        assert!(names.contains(&"yearly"));
        assert!(names.contains(&"deabcdefg01"));
        assert!(names.contains(&"atabcdefg01"));

        let years: Vec<i32> = table.partitions().iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2023, 2024]);
    }

    #[tokio::test]
    async fn skip_list_drops_programs() {
        let engine = Arc::new(LocalEngine::new());
        let manager = manager(engine);
        let params =
            AnalyticsTableUpdateParams::full().with_skip_programs(vec![uid("prabcdefg01")]);
        assert!(manager.tables(&params).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn populate_joins_and_filters_by_partition_year() {
        let engine = Arc::new(LocalEngine::new());
        engine.script_years(vec![2023]);
        let manager = manager(engine.clone());

        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();
        let table = &tables[0];
        manager
            .populate(table, Some(&table.partitions()[0]))
            .await
            .unwrap();

        let journal = engine.journal();
        assert_eq!(journal.len(), 1);
        let sql = &journal[0];
        assert!(sql.starts_with("insert into \"analytics_event_prabcdefg01_temp_2023\""));
        assert!(sql.contains("from \"event\" ev"));
        assert!(sql.contains("inner join \"analytics_rs_orgunitstructure\" ous"));
        assert!(sql.contains("en.programuid = 'prabcdefg01'"));
        assert!(sql.contains("ev.occurreddate >= '2023-01-01'"));
        assert!(sql.contains("ev.occurreddate < '2024-01-01'"));
        assert!(sql.contains("left join \"trackedentityattributevalue\" \"atabcdefg01\""));
    }

    #[tokio::test]
    async fn latest_tables_carry_single_latest_partition() {
        let engine = Arc::new(LocalEngine::new());
        let manager = manager(engine);
        let params = AnalyticsTableUpdateParams::latest();
        let from = params.start_time - Duration::days(3);

        let tables = manager.tables_for_latest(&params, from).await.unwrap();
        assert_eq!(tables.len(), 1);
        let latest = tables[0].latest_partition().unwrap();
        assert!(latest.is_latest());
        assert_eq!(latest.start_date, from.date_naive());
    }

    #[tokio::test]
    async fn remove_updated_data_deletes_by_window() {
        let engine = Arc::new(LocalEngine::new());
        engine.add_existing_table("analytics_event_prabcdefg01");
        let manager = manager(engine.clone());
        let params = AnalyticsTableUpdateParams::latest();
        let from = params.start_time - Duration::days(3);

        let tables = manager.tables_for_latest(&params, from).await.unwrap();
        manager.remove_updated_data(&tables).await.unwrap();

        let deletes = engine.journal_matching("delete from");
        assert_eq!(deletes.len(), 1);
        assert!(deletes[0].contains("\"analytics_event_prabcdefg01\""));
        assert!(deletes[0].contains("\"lastupdated\" >="));
    }
}
