//! The default data integrity check battery.
//!
//! Each check is a named pair of SQL queries against the operational
//! schema: a summary query counting offending rows and a details query
//! projecting `uid as id, name, comment` for each offender.

use serde::{Deserialize, Serialize};

/// How serious a failing check is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Severe,
}

/// A named data integrity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIntegrityCheck {
    /// Kebab-case identity used in the API.
    pub name: String,
    pub display_name: String,
    pub section: String,
    pub severity: Severity,
    pub description: String,
    /// Count query projecting a single `count` column.
    #[serde(skip)]
    pub summary_sql: String,
    /// Details query projecting `uid as id, name, comment`.
    #[serde(skip)]
    pub details_sql: String,
}

impl DataIntegrityCheck {
    fn new(
        name: &str,
        display_name: &str,
        section: &str,
        severity: Severity,
        description: &str,
        details_from: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            section: section.to_string(),
            severity,
            description: description.to_string(),
            summary_sql: format!("select count(*) as count {};", details_from),
            details_sql: format!("select uid as id, name, null as comment {};", details_from),
        }
    }
}

/// The built-in check registry.
pub fn default_checks() -> Vec<DataIntegrityCheck> {
    vec![
        DataIntegrityCheck::new(
            "data-elements-without-groups",
            "Data elements lacking data element groups",
            "Data elements",
            Severity::Warning,
            "Data elements should belong to at least one data element group.",
            "from dataelement de where not exists \
             (select 1 from dataelementgroupmembers m where m.dataelementid = de.dataelementid)",
        ),
        DataIntegrityCheck::new(
            "data-elements-without-data-sets",
            "Data elements not in any data set",
            "Data elements",
            Severity::Info,
            "Aggregate data elements should be part of a data set.",
            "from dataelement de where de.domaintype = 'AGGREGATE' and not exists \
             (select 1 from datasetelement dse where dse.dataelementid = de.dataelementid)",
        ),
        DataIntegrityCheck::new(
            "data-sets-not-assigned-to-org-units",
            "Data sets not assigned to organisation units",
            "Data sets",
            Severity::Warning,
            "Data sets without organisation unit assignments collect no data.",
            "from dataset ds where not exists \
             (select 1 from datasetsource s where s.datasetid = ds.datasetid)",
        ),
        DataIntegrityCheck::new(
            "indicators-with-identical-formulas",
            "Indicators with identical formulas",
            "Indicators",
            Severity::Warning,
            "Indicators sharing numerator and denominator are likely duplicates.",
            "from indicator i where exists (select 1 from indicator other \
             where other.indicatorid <> i.indicatorid \
             and other.numerator = i.numerator and other.denominator = i.denominator)",
        ),
        DataIntegrityCheck::new(
            "indicators-without-groups",
            "Indicators lacking indicator groups",
            "Indicators",
            Severity::Warning,
            "Indicators should belong to at least one indicator group.",
            "from indicator i where not exists \
             (select 1 from indicatorgroupmembers m where m.indicatorid = i.indicatorid)",
        ),
        DataIntegrityCheck::new(
            "invalid-indicator-numerators",
            "Indicators with invalid numerator expressions",
            "Indicators",
            Severity::Severe,
            "Numerator expressions must parse against current metadata.",
            "from indicator i where i.numeratorvalid = false",
        ),
        DataIntegrityCheck::new(
            "invalid-indicator-denominators",
            "Indicators with invalid denominator expressions",
            "Indicators",
            Severity::Severe,
            "Denominator expressions must parse against current metadata.",
            "from indicator i where i.denominatorvalid = false",
        ),
        DataIntegrityCheck::new(
            "duplicate-periods",
            "Duplicate periods",
            "Periods",
            Severity::Severe,
            "Periods of the same type must not share a start date.",
            "from period pe where exists (select 1 from period other \
             where other.periodid <> pe.periodid \
             and other.periodtypeid = pe.periodtypeid and other.startdate = pe.startdate)",
        ),
        DataIntegrityCheck::new(
            "org-units-with-cyclic-references",
            "Organisation units with cyclic references",
            "Organisation units",
            Severity::Severe,
            "An organisation unit must not be its own ancestor.",
            "from organisationunit ou where ou.path like \
             '%/' || ou.uid || '/%/' || ou.uid || '%'",
        ),
        DataIntegrityCheck::new(
            "orphaned-org-units",
            "Orphaned organisation units",
            "Organisation units",
            Severity::Severe,
            "Organisation units other than roots must have a parent.",
            "from organisationunit ou where ou.parentid is null \
             and exists (select 1 from organisationunit other where other.parentid is not null)",
        ),
        DataIntegrityCheck::new(
            "org-units-without-groups",
            "Organisation units lacking groups",
            "Organisation units",
            Severity::Warning,
            "Organisation units should belong to at least one group.",
            "from organisationunit ou where not exists \
             (select 1 from orgunitgroupmembers m where m.organisationunitid = ou.organisationunitid)",
        ),
        DataIntegrityCheck::new(
            "validation-rules-without-groups",
            "Validation rules lacking groups",
            "Validation rules",
            Severity::Info,
            "Validation rules should belong to at least one group.",
            "from validationrule vr where not exists \
             (select 1 from validationrulegroupmembers m where m.validationruleid = vr.validationruleid)",
        ),
        DataIntegrityCheck::new(
            "program-rules-without-condition",
            "Program rules without a condition",
            "Program rules",
            Severity::Warning,
            "Program rules without a condition never trigger.",
            "from programrule pr where pr.rulecondition is null or trim(pr.rulecondition) = ''",
        ),
        DataIntegrityCheck::new(
            "program-rules-without-action",
            "Program rules without an action",
            "Program rules",
            Severity::Warning,
            "Program rules without actions have no effect.",
            "from programrule pr where not exists \
             (select 1 from programruleaction a where a.programruleid = pr.programruleid)",
        ),
    ]
}
