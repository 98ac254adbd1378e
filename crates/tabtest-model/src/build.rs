//! Minimal table builders.
//!
//! These produce tables with the structure p-value augmentation relies on
//! (a keyed body, header records, per-variable metadata and the stored
//! data) and simple descriptive statistics in the cells.

use std::collections::BTreeMap;

use polars::prelude::{Column, DataFrame, DataType};
use tabtest_common::{column_f64, column_strings, format_numeric, is_numeric_dtype, sorted_levels};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::table::{
    CallRecord, CrossTable, DesignSpec, GtTable, HeaderRecord, SummaryTable, SurvFit, SurvFormula,
    SurveyTable, SurvivalTable, TableCore, VariableMeta,
};
use crate::types::{RowType, SummaryType};

/// Level shown for missing values in cross tables.
pub const UNKNOWN_LEVEL: &str = "Unknown";

/// Variable name used for an unstratified survival fit.
pub const OVERALL_VARIABLE: &str = "..overall..";

/// Options shared by the summary builders.
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub by: Option<String>,
    /// Variables to summarise; all remaining columns when `None`.
    pub include: Option<Vec<String>>,
    pub types: BTreeMap<String, SummaryType>,
    pub labels: BTreeMap<String, String>,
}

impl SummaryOptions {
    pub fn by(mut self, by: impl Into<String>) -> Self {
        self.by = Some(by.into());
        self
    }

    pub fn include<S: AsRef<str>>(mut self, variables: &[S]) -> Self {
        self.include = Some(variables.iter().map(|v| v.as_ref().to_string()).collect());
        self
    }

    pub fn summary_type(mut self, variable: impl Into<String>, summary_type: SummaryType) -> Self {
        self.types.insert(variable.into(), summary_type);
        self
    }
}

fn require_column(df: &DataFrame, name: &str) -> Result<()> {
    if df.column(name).is_err() {
        return Err(ModelError::UnknownColumn {
            column: name.to_string(),
        });
    }
    Ok(())
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn is_true_level(level: &str) -> bool {
    matches!(level.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn is_false_level(level: &str) -> bool {
    matches!(level.to_ascii_lowercase().as_str(), "0" | "false" | "no")
}

/// Guess the summary type of a column.
///
/// Booleans and two-level 0/1, TRUE/FALSE or yes/no columns are
/// dichotomous. Numbers with fewer than ten distinct values are
/// categorical, other numbers continuous, everything else categorical.
pub fn infer_summary_type(df: &DataFrame, name: &str) -> Result<SummaryType> {
    require_column(df, name)?;
    let dtype = df.column(name)?.dtype().clone();
    if dtype == DataType::Boolean {
        return Ok(SummaryType::Dichotomous);
    }
    let levels = sorted_levels(&column_strings(df, name)?);
    let two_valued = !levels.is_empty()
        && levels.len() <= 2
        && levels.iter().all(|l| is_true_level(l) || is_false_level(l));
    if two_valued {
        return Ok(SummaryType::Dichotomous);
    }
    if is_numeric_dtype(&dtype) {
        if levels.len() < 10 {
            return Ok(SummaryType::Categorical);
        }
        return Ok(SummaryType::Continuous);
    }
    Ok(SummaryType::Categorical)
}

struct BodyBuilder {
    variable: Vec<String>,
    var_type: Vec<String>,
    row_type: Vec<String>,
    label: Vec<String>,
    stats: Vec<Vec<String>>,
}

impl BodyBuilder {
    fn new(stat_columns: usize) -> Self {
        Self {
            variable: Vec::new(),
            var_type: Vec::new(),
            row_type: Vec::new(),
            label: Vec::new(),
            stats: vec![Vec::new(); stat_columns],
        }
    }

    fn push(
        &mut self,
        variable: &str,
        summary_type: SummaryType,
        row_type: RowType,
        label: &str,
        cells: Vec<String>,
    ) {
        self.variable.push(variable.to_string());
        self.var_type.push(summary_type.as_str().to_string());
        self.row_type.push(row_type.as_str().to_string());
        self.label.push(label.to_string());
        for (column, cell) in self.stats.iter_mut().zip(cells) {
            column.push(cell);
        }
    }

    fn finish(self, stat_names: &[String]) -> Result<DataFrame> {
        let mut columns = vec![
            Column::new("variable".into(), self.variable),
            Column::new("var_type".into(), self.var_type),
            Column::new("row_type".into(), self.row_type),
            Column::new("label".into(), self.label),
        ];
        for (name, values) in stat_names.iter().zip(self.stats) {
            columns.push(Column::new(name.as_str().into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }
}

fn base_header(stat_labels: &[(String, String)]) -> Vec<HeaderRecord> {
    let mut header = vec![
        HeaderRecord::hidden("variable"),
        HeaderRecord::hidden("var_type"),
        HeaderRecord::hidden("row_type"),
        HeaderRecord::visible("label", "**Characteristic**"),
    ];
    for (column, label) in stat_labels {
        header.push(HeaderRecord::visible(column.clone(), label.clone()));
    }
    header
}

/// Weighted quantile by inverse of the weighted empirical CDF.
fn weighted_quantile(pairs: &[(f64, f64)], q: f64) -> Option<f64> {
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if pairs.is_empty() || total <= 0.0 {
        return None;
    }
    let mut cumulative = 0.0;
    for (value, weight) in pairs {
        cumulative += weight;
        if cumulative >= q * total - 1e-12 {
            return Some(*value);
        }
    }
    pairs.last().map(|(v, _)| *v)
}

fn round1(v: f64) -> String {
    format_numeric((v * 10.0).round() / 10.0)
}

fn continuous_cell(values: &[(f64, f64)]) -> String {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    match (
        weighted_quantile(&sorted, 0.5),
        weighted_quantile(&sorted, 0.25),
        weighted_quantile(&sorted, 0.75),
    ) {
        (Some(m), Some(lo), Some(hi)) => format!("{} ({}, {})", round1(m), round1(lo), round1(hi)),
        _ => String::new(),
    }
}

fn count_cell(n: f64, total: f64) -> String {
    let pct = if total > 0.0 { 100.0 * n / total } else { 0.0 };
    format!("{} ({}%)", format_numeric(n.round()), format_numeric(pct.round()))
}

/// Group index per observation; `None` when the by value is missing.
struct Grouping {
    index: Vec<Option<usize>>,
    names: Vec<String>,
    labels: Vec<(String, String)>,
}

fn grouping(df: &DataFrame, by: Option<&str>, weights: &[f64]) -> Result<Grouping> {
    let n = df.height();
    let Some(by) = by else {
        let total: f64 = weights.iter().sum();
        return Ok(Grouping {
            index: vec![Some(0); n],
            names: vec!["stat_0".to_string()],
            labels: vec![(
                "stat_0".to_string(),
                format!("**Overall**, N = {}", format_numeric(total.round())),
            )],
        });
    };
    require_column(df, by)?;
    let values = column_strings(df, by)?;
    let levels = sorted_levels(&values);
    let index: Vec<Option<usize>> = values
        .iter()
        .map(|v| v.as_ref().and_then(|v| levels.iter().position(|l| l == v)))
        .collect();
    let names: Vec<String> = (1..=levels.len()).map(|i| format!("stat_{i}")).collect();
    let labels = levels
        .iter()
        .enumerate()
        .map(|(g, level)| {
            let total: f64 = index
                .iter()
                .zip(weights)
                .filter(|(i, _)| **i == Some(g))
                .map(|(_, w)| w)
                .sum();
            (
                names[g].clone(),
                format!("**{level}**, N = {}", format_numeric(total.round())),
            )
        })
        .collect();
    Ok(Grouping {
        index,
        names,
        labels,
    })
}

fn summarise_variable(
    body: &mut BodyBuilder,
    df: &DataFrame,
    meta: &VariableMeta,
    groups: &Grouping,
    weights: &[f64],
) -> Result<()> {
    let ngroups = groups.names.len();
    let name = meta.variable.as_str();
    let st = meta.summary_type;
    let text = column_strings(df, name)?;

    let mut missing = vec![0.0; ngroups];
    let mut totals = vec![0.0; ngroups];
    for ((value, group), w) in text.iter().zip(&groups.index).zip(weights) {
        if let Some(g) = group {
            totals[*g] += w;
            if value.is_none() {
                missing[*g] += w;
            }
        }
    }
    let observed: Vec<f64> = totals.iter().zip(&missing).map(|(t, m)| t - m).collect();

    if st.is_continuous() {
        let numbers = column_f64(df, name)?;
        let cells: Vec<String> = (0..ngroups)
            .map(|g| {
                let pairs: Vec<(f64, f64)> = numbers
                    .iter()
                    .zip(&groups.index)
                    .zip(weights)
                    .filter(|((_, i), _)| **i == Some(g))
                    .filter_map(|((v, _), w)| v.map(|v| (v, *w)))
                    .collect();
                continuous_cell(&pairs)
            })
            .collect();
        if st == SummaryType::Continuous {
            body.push(name, st, RowType::Label, &meta.var_label, cells);
        } else {
            body.push(name, st, RowType::Label, &meta.var_label, vec![String::new(); ngroups]);
            body.push(name, st, RowType::Level, "Median (Q1, Q3)", cells);
        }
    } else {
        let levels = sorted_levels(&text);
        let count = |level: &str, g: usize| -> f64 {
            text.iter()
                .zip(&groups.index)
                .zip(weights)
                .filter(|((v, i), _)| **i == Some(g) && v.as_deref() == Some(level))
                .map(|(_, w)| w)
                .sum()
        };
        if st == SummaryType::Dichotomous {
            let shown = levels
                .iter()
                .find(|l| is_true_level(l))
                .or(levels.last())
                .cloned()
                .unwrap_or_default();
            let cells = (0..ngroups)
                .map(|g| count_cell(count(&shown, g), observed[g]))
                .collect();
            body.push(name, st, RowType::Label, &meta.var_label, cells);
        } else {
            body.push(name, st, RowType::Label, &meta.var_label, vec![String::new(); ngroups]);
            for level in &levels {
                let cells = (0..ngroups)
                    .map(|g| count_cell(count(level, g), observed[g]))
                    .collect();
                body.push(name, st, RowType::Level, level, cells);
            }
        }
    }

    if missing.iter().any(|m| *m > 0.0) {
        let cells = missing.iter().map(|m| format_numeric(m.round())).collect();
        body.push(name, st, RowType::Missing, UNKNOWN_LEVEL, cells);
    }
    Ok(())
}

fn variable_metas(
    df: &DataFrame,
    options: &SummaryOptions,
    reserved: &[&str],
) -> Result<Vec<VariableMeta>> {
    let variables: Vec<String> = match &options.include {
        Some(list) => list.clone(),
        None => column_names(df)
            .into_iter()
            .filter(|c| Some(c.as_str()) != options.by.as_deref() && !reserved.contains(&c.as_str()))
            .collect(),
    };
    variables
        .into_iter()
        .map(|v| {
            require_column(df, &v)?;
            if Some(v.as_str()) == options.by.as_deref() {
                return Err(ModelError::InvalidArgument {
                    argument: "include",
                    reason: format!("`{v}` is the by variable"),
                });
            }
            let summary_type = match options.types.get(&v) {
                Some(t) => *t,
                None => {
                    let inferred = infer_summary_type(df, &v)?;
                    debug!(variable = %v, summary_type = inferred.as_str(), "inferred summary type");
                    inferred
                }
            };
            let mut meta = VariableMeta::new(v.clone(), summary_type);
            if let Some(label) = options.labels.get(&v) {
                meta.var_label = label.clone();
            }
            Ok(meta)
        })
        .collect()
}

fn summary_core(
    df: &DataFrame,
    options: &SummaryOptions,
    weights: &[f64],
    reserved: &[&str],
) -> Result<TableCore> {
    let meta = variable_metas(df, options, reserved)?;
    let groups = grouping(df, options.by.as_deref(), weights)?;
    let mut body = BodyBuilder::new(groups.names.len());
    for m in &meta {
        summarise_variable(&mut body, df, m, &groups, weights)?;
    }
    Ok(TableCore {
        body: body.finish(&groups.names)?,
        header: base_header(&groups.labels),
        meta,
        by: options.by.clone(),
        source_notes: Vec::new(),
        calls: Vec::new(),
    })
}

fn options_arguments(options: &SummaryOptions) -> Vec<(String, String)> {
    let mut args = Vec::new();
    if let Some(by) = &options.by {
        args.push(("by".to_string(), by.clone()));
    }
    if let Some(include) = &options.include {
        args.push(("include".to_string(), include.join(", ")));
    }
    args
}

/// Summary table of `data`, optionally split by `options.by`.
pub fn tbl_summary(data: DataFrame, options: &SummaryOptions) -> Result<GtTable> {
    let weights = vec![1.0; data.height()];
    let mut core = summary_core(&data, options, &weights, &[])?;
    core.calls
        .push(CallRecord::new("tbl_summary", options_arguments(options)));
    Ok(GtTable::Summary(SummaryTable { core, data }))
}

/// Survey-weighted summary table.
pub fn tbl_svysummary(design: DesignSpec, options: &SummaryOptions) -> Result<GtTable> {
    let df = &design.data;
    require_column(df, &design.weights)?;
    let weights: Vec<f64> = column_f64(df, &design.weights)?
        .into_iter()
        .map(|w| w.unwrap_or(0.0))
        .collect();
    let mut reserved = vec![design.weights.as_str()];
    reserved.extend(design.strata.as_deref());
    reserved.extend(design.cluster.as_deref());
    for column in &reserved {
        require_column(df, column)?;
    }
    let mut core = summary_core(df, options, &weights, &reserved)?;
    let mut arguments = options_arguments(options);
    arguments.push(("weights".to_string(), design.weights.clone()));
    core.calls.push(CallRecord::new("tbl_svysummary", arguments));
    Ok(GtTable::Survey(SurveyTable { core, design }))
}

fn with_unknown(values: Vec<Option<String>>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.unwrap_or_else(|| UNKNOWN_LEVEL.to_string()))
        .collect()
}

/// Cross-tabulation of `row` against `col`. Missing values become the
/// level `Unknown` in both the display and the stored data.
pub fn tbl_cross(data: DataFrame, row: &str, col: &str) -> Result<GtTable> {
    require_column(&data, row)?;
    require_column(&data, col)?;
    if row == col {
        return Err(ModelError::InvalidArgument {
            argument: "col",
            reason: "row and column variables must differ".to_string(),
        });
    }
    let rows = with_unknown(column_strings(&data, row)?);
    let cols = with_unknown(column_strings(&data, col)?);
    let stored = DataFrame::new(vec![
        Column::new(row.into(), rows.clone()),
        Column::new(col.into(), cols.clone()),
    ])?;

    let level_sort = |values: &[String]| {
        let mut levels = sorted_levels(
            &values
                .iter()
                .filter(|v| *v != UNKNOWN_LEVEL)
                .map(|v| Some(v.clone()))
                .collect::<Vec<_>>(),
        );
        if values.iter().any(|v| v == UNKNOWN_LEVEL) {
            levels.push(UNKNOWN_LEVEL.to_string());
        }
        levels
    };
    let row_levels = level_sort(&rows);
    let col_levels = level_sort(&cols);

    let mut names: Vec<String> = (1..=col_levels.len()).map(|i| format!("stat_{i}")).collect();
    names.push("stat_0".to_string());
    let mut labels: Vec<(String, String)> = col_levels
        .iter()
        .zip(&names)
        .map(|(level, name)| (name.clone(), level.clone()))
        .collect();
    labels.push(("stat_0".to_string(), "Total".to_string()));

    let st = SummaryType::Categorical;
    let mut body = BodyBuilder::new(names.len());
    body.push(row, st, RowType::Label, row, vec![String::new(); names.len()]);
    for level in &row_levels {
        let mut cells: Vec<String> = col_levels
            .iter()
            .map(|c| {
                let n = rows
                    .iter()
                    .zip(&cols)
                    .filter(|(r, k)| *r == level && *k == c)
                    .count();
                n.to_string()
            })
            .collect();
        cells.push(rows.iter().filter(|r| *r == level).count().to_string());
        let row_type = if level == UNKNOWN_LEVEL {
            RowType::Missing
        } else {
            RowType::Level
        };
        body.push(row, st, row_type, level, cells);
    }

    let core = TableCore {
        body: body.finish(&names)?,
        header: base_header(&labels),
        meta: vec![VariableMeta::new(row, st)],
        by: Some(col.to_string()),
        source_notes: Vec::new(),
        calls: vec![CallRecord::new(
            "tbl_cross",
            vec![
                ("row".to_string(), row.to_string()),
                ("col".to_string(), col.to_string()),
            ],
        )],
    };
    Ok(GtTable::Cross(CrossTable {
        core,
        data: stored,
        row_var: row.to_string(),
    }))
}

/// Kaplan-Meier median survival time, `None` when not reached.
pub fn km_median(times: &[(f64, bool)]) -> Option<f64> {
    let mut sorted = times.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut at_risk = sorted.len() as f64;
    let mut survival = 1.0;
    let mut i = 0;
    while i < sorted.len() {
        let t = sorted[i].0;
        let mut deaths = 0.0;
        let mut leaving = 0.0;
        while i < sorted.len() && sorted[i].0 == t {
            if sorted[i].1 {
                deaths += 1.0;
            }
            leaving += 1.0;
            i += 1;
        }
        if deaths > 0.0 {
            survival *= 1.0 - deaths / at_risk;
            if survival <= 0.5 {
                return Some(t);
            }
        }
        at_risk -= leaving;
    }
    None
}

fn survival_cells(pairs: &[(f64, bool)]) -> Vec<String> {
    let events = pairs.iter().filter(|(_, e)| *e).count();
    vec![
        format!("{events} / {}", pairs.len()),
        km_median(pairs).map_or_else(|| "NR".to_string(), round1),
    ]
}

/// Survival-curve table: one fit per stratifying variable, or a single
/// unstratified fit when `strata` is empty.
pub fn tbl_survfit<S: AsRef<str>>(
    data: DataFrame,
    time: &str,
    status: &str,
    strata: &[S],
) -> Result<GtTable> {
    require_column(&data, time)?;
    require_column(&data, status)?;
    let times = column_f64(&data, time)?;
    let statuses = column_f64(&data, status)?;

    let names = vec!["stat_1".to_string(), "stat_2".to_string()];
    let labels = vec![
        ("stat_1".to_string(), "**Events / N**".to_string()),
        ("stat_2".to_string(), "**Median Survival**".to_string()),
    ];
    let mut body = BodyBuilder::new(names.len());
    let mut meta = Vec::new();
    let mut fits = Vec::new();
    let st = SummaryType::Categorical;

    let complete = |i: usize| -> Option<(f64, bool)> {
        Some((times[i]?, statuses[i]? > 0.0))
    };

    if strata.is_empty() {
        let pairs: Vec<(f64, bool)> = (0..data.height()).filter_map(complete).collect();
        body.push(OVERALL_VARIABLE, st, RowType::Label, "Overall", survival_cells(&pairs));
        let mut m = VariableMeta::new(OVERALL_VARIABLE, st);
        m.var_label = "Overall".to_string();
        meta.push(m);
        fits.push(SurvFit {
            variable: OVERALL_VARIABLE.to_string(),
            formula: SurvFormula {
                time: time.to_string(),
                status: status.to_string(),
                strata: None,
            },
            data: data.clone(),
        });
    }

    for variable in strata {
        let variable = variable.as_ref();
        require_column(&data, variable)?;
        let groups = column_strings(&data, variable)?;
        let levels = sorted_levels(&groups);
        body.push(variable, st, RowType::Label, variable, vec![String::new(); 2]);
        for level in &levels {
            let pairs: Vec<(f64, bool)> = (0..data.height())
                .filter(|&i| groups[i].as_deref() == Some(level.as_str()))
                .filter_map(complete)
                .collect();
            body.push(variable, st, RowType::Level, level, survival_cells(&pairs));
        }
        let mut m = VariableMeta::new(variable, st);
        m.stratified = true;
        meta.push(m);
        fits.push(SurvFit {
            variable: variable.to_string(),
            formula: SurvFormula {
                time: time.to_string(),
                status: status.to_string(),
                strata: Some(variable.to_string()),
            },
            data: data.clone(),
        });
    }

    let rendered: Vec<String> = fits.iter().map(|f| f.formula.render()).collect();
    let core = TableCore {
        body: body.finish(&names)?,
        header: base_header(&labels),
        meta,
        by: None,
        source_notes: Vec::new(),
        calls: vec![CallRecord::new(
            "tbl_survfit",
            vec![("x".to_string(), rendered.join("; "))],
        )],
    };
    Ok(GtTable::Survival(SurvivalTable { core, fits }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn km_median_simple() {
        let pairs = [(1.0, true), (2.0, true), (3.0, true), (4.0, false)];
        // S(1) = 0.75, S(2) = 0.5
        assert_eq!(km_median(&pairs), Some(2.0));
        assert_eq!(km_median(&[(1.0, false), (2.0, false)]), None);
    }

    #[test]
    fn weighted_quantile_unit_weights() {
        let pairs: Vec<(f64, f64)> = (1..=5).map(|v| (f64::from(v), 1.0)).collect();
        assert_eq!(weighted_quantile(&pairs, 0.5), Some(3.0));
        assert_eq!(weighted_quantile(&[], 0.5), None);
    }

    #[test]
    fn count_cells_round() {
        assert_eq!(count_cell(1.0, 3.0), "1 (33%)");
        assert_eq!(count_cell(0.0, 0.0), "0 (0%)");
    }
}
