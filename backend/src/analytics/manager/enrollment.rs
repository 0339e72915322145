//! Enrollment analytics tables, one per registration program.
//!
//! Unpartitioned: enrollments are few relative to events and the whole
//! table is rebuilt on every run.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{EngineError, EngineResult};
use crate::models::Program;
use crate::sql::ColumnDataType;

use super::super::column::AnalyticsTableColumn;
use super::super::params::AnalyticsTableUpdateParams;
use super::super::table::{AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType};
use super::{
    AnalyticsTableManager, ManagerContext, DATE_PERIOD_STRUCTURE, ORG_UNIT_GROUP_SET_STRUCTURE,
    ORG_UNIT_STRUCTURE,
};

pub struct EnrollmentTableManager {
    ctx: Arc<ManagerContext>,
}

impl EnrollmentTableManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn columns(&self, program: &Program) -> Vec<AnalyticsTableColumn> {
        let mut columns = vec![
            AnalyticsTableColumn::new("enrollment", ColumnDataType::Character11, "en.uid")
                .not_null(),
            AnalyticsTableColumn::new("te", ColumnDataType::Character11, "te.uid"),
            AnalyticsTableColumn::new("enrollmentdate", ColumnDataType::Timestamp, "en.enrollmentdate")
                .not_null(),
            AnalyticsTableColumn::new("completeddate", ColumnDataType::Timestamp, "en.completeddate"),
            AnalyticsTableColumn::new("lastupdated", ColumnDataType::Timestamp, "en.lastupdated"),
            AnalyticsTableColumn::new(
                "enrollmentstatus",
                ColumnDataType::Varchar50,
                "en.status",
            )
            .indexed(),
            AnalyticsTableColumn::new("longitude", ColumnDataType::Double, "en.longitude")
                .as_fact(),
            AnalyticsTableColumn::new("latitude", ColumnDataType::Double, "en.latitude").as_fact(),
            AnalyticsTableColumn::new("storedby", ColumnDataType::Varchar255, "en.storedby")
                .as_fact(),
        ];

        columns.extend(self.ctx.org_unit_columns());
        columns.extend(self.ctx.period_columns());

        for attribute in &program.attributes {
            columns.push(self.ctx.mapper().attribute_column(attribute));
        }

        self.ctx.filter_columns(columns)
    }

    fn from_clause(&self, program: &Program) -> String {
        let sql = self.ctx.sql();
        let mut clause = format!(
            "from {} en \
             inner join {} te on en.trackedentityid = te.trackedentityid \
             inner join {} ous on en.organisationunitid = ous.organisationunitid \
             left join {} ougs on en.organisationunitid = ougs.organisationunitid \
             inner join {} dps on cast(en.enrollmentdate as date) = dps.dateperiod",
            sql.qualify_table("enrollment"),
            sql.qualify_table("trackedentity"),
            sql.quote(ORG_UNIT_STRUCTURE),
            sql.quote(ORG_UNIT_GROUP_SET_STRUCTURE),
            sql.quote(DATE_PERIOD_STRUCTURE),
        );
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
        clause.push_str(&format!(
            " where en.programuid = {} and en.enrollmentdate is not null and en.deleted = false",
            sql.single_quote(program.uid.as_str()),
        ));
        clause
    }
}

#[async_trait]
impl AnalyticsTableManager for EnrollmentTableManager {
    fn table_type(&self) -> AnalyticsTableType {
        AnalyticsTableType::Enrollment
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
                    AnalyticsTableType::Enrollment,
                    self.columns(program),
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
            .ok_or_else(|| EngineError::internal("enrollment table without a program"))?;
        let target = self.ctx.populate_target(table, partition);
        let sql = self
            .ctx
            .insert_select(&target, table.columns(), &self.from_clause(program));
        self.ctx.engine().execute(&sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalEngine;
    use crate::models::{
        MetadataRegistry, ProgramType, TrackedEntityAttribute, Uid, ValueType,
    };
    use crate::settings::SettingsService;
    use crate::sql::PostgresSqlBuilder;

    fn uid(s: &str) -> Uid {
        Uid::new(s).unwrap()
    }

    fn manager(engine: Arc<LocalEngine>) -> EnrollmentTableManager {
        let registry = MetadataRegistry::new().with_programs(vec![
            Program::new(uid("prabcdefg01"), "Tracker", ProgramType::WithRegistration)
                .with_attributes(vec![TrackedEntityAttribute::new(
                    uid("atabcdefg01"),
                    "Age",
                    ValueType::Integer,
                )]),
            Program::new(uid("prabcdefg02"), "Events only", ProgramType::WithoutRegistration),
        ]);
        EnrollmentTableManager::new(Arc::new(ManagerContext::new(
            Arc::new(registry),
            engine,
            Arc::new(SettingsService::new()),
            Arc::new(PostgresSqlBuilder::new()),
        )))
    }

    #[tokio::test]
    async fn only_registration_programs_get_tables() {
        let manager = manager(Arc::new(LocalEngine::new()));
        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name(), "analytics_enrollment_prabcdefg01");
        assert!(!tables[0].has_partitions());
    }

    #[tokio::test]
    async fn populate_targets_staging_master() {
        let engine = Arc::new(LocalEngine::new());
        let manager = manager(engine.clone());
        let tables = manager.tables(&AnalyticsTableUpdateParams::full()).await.unwrap();

        manager.populate(&tables[0], None).await.unwrap();

        let journal = engine.journal();
        assert_eq!(journal.len(), 1);
        assert!(journal[0].starts_with("insert into \"analytics_enrollment_prabcdefg01_temp\""));
        assert!(journal[0].contains("from \"enrollment\" en"));
        assert!(journal[0].contains("en.programuid = 'prabcdefg01'"));
        assert!(journal[0].contains("\"atabcdefg01\".value"));
    }
}
