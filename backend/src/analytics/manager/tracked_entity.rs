//! Tracked entity analytics tables, one per tracked entity type.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{EngineError, EngineResult};
use crate::models::TrackedEntityType;
use crate::sql::ColumnDataType;

use super::super::column::AnalyticsTableColumn;
use super::super::params::AnalyticsTableUpdateParams;
use super::super::table::{AnalyticsTable, AnalyticsTablePartition, AnalyticsTableType};
use super::{
    AnalyticsTableManager, ManagerContext, ORG_UNIT_GROUP_SET_STRUCTURE, ORG_UNIT_STRUCTURE,
};

pub struct TrackedEntityTableManager {
    ctx: Arc<ManagerContext>,
}

impl TrackedEntityTableManager {
    pub fn new(ctx: Arc<ManagerContext>) -> Self {
        Self { ctx }
    }

    fn columns(&self, tracked_entity_type: &TrackedEntityType) -> Vec<AnalyticsTableColumn> {
        let mut columns = vec![
            AnalyticsTableColumn::new("trackedentity", ColumnDataType::Character11, "te.uid")
                .not_null(),
            AnalyticsTableColumn::new("created", ColumnDataType::Timestamp, "te.created"),
            AnalyticsTableColumn::new("lastupdated", ColumnDataType::Timestamp, "te.lastupdated"),
            AnalyticsTableColumn::new("inactive", ColumnDataType::Boolean, "te.inactive")
                .as_fact(),
        ];

        columns.extend(self.ctx.org_unit_columns());

        for attribute in &tracked_entity_type.attributes {
            columns.push(self.ctx.mapper().attribute_column(attribute));
        }

        self.ctx.filter_columns(columns)
    }

    fn from_clause(&self, tracked_entity_type: &TrackedEntityType) -> String {
        let sql = self.ctx.sql();
        let mut clause = format!(
            "from {} te \
             inner join {} ous on te.organisationunitid = ous.organisationunitid \
             left join {} ougs on te.organisationunitid = ougs.organisationunitid",
            sql.qualify_table("trackedentity"),
            sql.quote(ORG_UNIT_STRUCTURE),
            sql.quote(ORG_UNIT_GROUP_SET_STRUCTURE),
        );
        for attribute in &tracked_entity_type.attributes {
            let alias = sql.quote(attribute.uid.as_str());
            clause.push_str(&format!(
                " left join {} {} on {}.trackedentityid = te.trackedentityid \
                 and {}.trackedentityattributeuid = {}",
                sql.qualify_table("trackedentityattributevalue"),
                alias,
                alias,
                alias,
                sql.single_quote(attribute.uid.as_str()),
            ));
        }
        clause.push_str(&format!(
            " where te.trackedentitytypeuid = {} and te.deleted = false",
            sql.single_quote(tracked_entity_type.uid.as_str()),
        ));
        clause
    }
}

#[async_trait]
impl AnalyticsTableManager for TrackedEntityTableManager {
    fn table_type(&self) -> AnalyticsTableType {
        AnalyticsTableType::TrackedEntity
    }

    async fn tables(&self, _params: &AnalyticsTableUpdateParams) -> EngineResult<Vec<AnalyticsTable>> {
        Ok(self
            .ctx
            .registry()
            .tracked_entity_types()
            .iter()
            .map(|tet| {
                AnalyticsTable::for_tracked_entity_type(
                    AnalyticsTableType::TrackedEntity,
                    self.columns(tet),
                    tet.clone(),
                )
            })
            .collect())
    }

    async fn populate(
        &self,
        table: &AnalyticsTable,
        partition: Option<&AnalyticsTablePartition>,
    ) -> EngineResult<()> {
        let tracked_entity_type = table
            .tracked_entity_type()
            .ok_or_else(|| EngineError::internal("tracked entity table without a type"))?;
        let target = self.ctx.populate_target(table, partition);
        let sql = self.ctx.insert_select(
            &target,
            table.columns(),
            &self.from_clause(tracked_entity_type),
        );
        self.ctx.engine().execute(&sql).await?;
        Ok(())
    }
}
