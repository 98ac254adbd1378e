//! The table object that p-values are added to.

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::format::PvalueFormatter;
use crate::types::{SummaryType, TableKind};

/// Display metadata for one body column.
#[derive(Debug, Clone)]
pub struct HeaderRecord {
    pub column: String,
    pub label: String,
    pub hide: bool,
    pub footnote: Option<String>,
    /// Formatter for numeric cells; `None` prints the raw value.
    pub formatter: Option<PvalueFormatter>,
}

impl HeaderRecord {
    /// Default record for a column: hidden, labelled with its own name.
    pub fn hidden(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            label: column.clone(),
            column,
            hide: true,
            footnote: None,
            formatter: None,
        }
    }

    pub fn visible(column: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            label: label.into(),
            hide: false,
            footnote: None,
            formatter: None,
        }
    }
}

/// Outcome of one variable's test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub p_value: Option<f64>,
    pub label: Option<String>,
    pub statistic: Option<f64>,
    pub parameter: Option<f64>,
}

impl TestResult {
    /// Result for a variable that was not tested.
    pub fn missing() -> Self {
        Self::default()
    }
}

/// One row of the metadata table: a variable and its test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMeta {
    pub variable: String,
    pub summary_type: SummaryType,
    pub var_label: String,
    /// Survival tables: whether the fit for this row is stratified.
    pub stratified: bool,
    pub test: Option<String>,
    pub result: Option<TestResult>,
}

impl VariableMeta {
    pub fn new(variable: impl Into<String>, summary_type: SummaryType) -> Self {
        let variable = variable.into();
        Self {
            var_label: variable.clone(),
            variable,
            summary_type,
            stratified: false,
            test: None,
            result: None,
        }
    }
}

/// Audit record of a call that built or modified a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub function: String,
    pub arguments: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(function: impl Into<String>, arguments: Vec<(String, String)>) -> Self {
        Self {
            function: function.into(),
            arguments,
            timestamp: Utc::now(),
        }
    }

    /// `function(name = value, ...)`
    pub fn render(&self) -> String {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|(k, v)| format!("{k} = {v}"))
            .collect();
        format!("{}({})", self.function, args.join(", "))
    }
}

/// State shared by every table kind.
#[derive(Debug, Clone)]
pub struct TableCore {
    /// One row per displayed line, keyed by `(variable, row_type)`.
    pub body: DataFrame,
    pub header: Vec<HeaderRecord>,
    pub meta: Vec<VariableMeta>,
    pub by: Option<String>,
    pub source_notes: Vec<String>,
    pub calls: Vec<CallRecord>,
}

impl TableCore {
    pub fn header_for(&self, column: &str) -> Option<&HeaderRecord> {
        self.header.iter().find(|h| h.column == column)
    }

    pub fn header_for_mut(&mut self, column: &str) -> Option<&mut HeaderRecord> {
        self.header.iter_mut().find(|h| h.column == column)
    }

    pub fn meta_for(&self, variable: &str) -> Option<&VariableMeta> {
        self.meta.iter().find(|m| m.variable == variable)
    }

    /// `(variable, summary type)` pairs in table order, for selectors.
    pub fn variable_types(&self) -> Vec<(String, SummaryType)> {
        self.meta
            .iter()
            .map(|m| (m.variable.clone(), m.summary_type))
            .collect()
    }
}

/// A dataset with survey weights and design columns.
#[derive(Debug, Clone)]
pub struct DesignSpec {
    pub data: DataFrame,
    pub weights: String,
    pub strata: Option<String>,
    pub cluster: Option<String>,
}

/// `Surv(time, status) ~ strata`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurvFormula {
    pub time: String,
    pub status: String,
    pub strata: Option<String>,
}

impl SurvFormula {
    pub fn render(&self) -> String {
        format!(
            "Surv({}, {}) ~ {}",
            self.time,
            self.status,
            self.strata.as_deref().unwrap_or("1")
        )
    }
}

/// A stored survival-curve fit: the formula and the data it was fitted on.
#[derive(Debug, Clone)]
pub struct SurvFit {
    /// Metadata variable this fit produced.
    pub variable: String,
    pub formula: SurvFormula,
    pub data: DataFrame,
}

#[derive(Debug, Clone)]
pub struct SummaryTable {
    pub core: TableCore,
    pub data: DataFrame,
}

#[derive(Debug, Clone)]
pub struct CrossTable {
    pub core: TableCore,
    pub data: DataFrame,
    /// Variable shown down the rows; the column variable is `core.by`.
    pub row_var: String,
}

#[derive(Debug, Clone)]
pub struct SurveyTable {
    pub core: TableCore,
    pub design: DesignSpec,
}

#[derive(Debug, Clone)]
pub struct SurvivalTable {
    pub core: TableCore,
    pub fits: Vec<SurvFit>,
}

/// A table of one of the supported kinds.
#[derive(Debug, Clone)]
pub enum GtTable {
    Summary(SummaryTable),
    Cross(CrossTable),
    Survey(SurveyTable),
    Survival(SurvivalTable),
}

impl GtTable {
    pub fn kind(&self) -> TableKind {
        match self {
            Self::Summary(_) => TableKind::Summary,
            Self::Cross(_) => TableKind::Cross,
            Self::Survey(_) => TableKind::Survey,
            Self::Survival(_) => TableKind::Survival,
        }
    }

    pub fn core(&self) -> &TableCore {
        match self {
            Self::Summary(t) => &t.core,
            Self::Cross(t) => &t.core,
            Self::Survey(t) => &t.core,
            Self::Survival(t) => &t.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut TableCore {
        match self {
            Self::Summary(t) => &mut t.core,
            Self::Cross(t) => &mut t.core,
            Self::Survey(t) => &mut t.core,
            Self::Survival(t) => &mut t.core,
        }
    }

    /// The flat dataset behind the table, if it has one.
    pub fn data(&self) -> Option<&DataFrame> {
        match self {
            Self::Summary(t) => Some(&t.data),
            Self::Cross(t) => Some(&t.data),
            Self::Survey(t) => Some(&t.design.data),
            Self::Survival(_) => None,
        }
    }
}
