//! Fold test results back into the table.

use std::collections::HashMap;

use polars::prelude::Column;
use tabtest_common::column_strings;
use tabtest_model::{CallRecord, HeaderRecord, PvalueFormatter, RowType, TableCore, TestResult};

use crate::error::Result;
use crate::execute::Computed;

pub const PVALUE_COLUMN: &str = "p.value";
const PVALUE_HEADER: &str = "**p-value**";

/// Write results into the metadata, body and header of `core`.
///
/// Only the `p.value` column and its header record change; every other
/// body column and the row order are left as they were. Variables without
/// a computed result get a missing p-value and add nothing to the footnote.
pub(crate) fn merge_results(
    core: &mut TableCore,
    computed: &[Computed],
    formatter: PvalueFormatter,
) -> Result<()> {
    let by_variable: HashMap<&str, &Computed> =
        computed.iter().map(|c| (c.variable.as_str(), c)).collect();

    for meta in &mut core.meta {
        match by_variable.get(meta.variable.as_str()) {
            Some(c) => {
                meta.test = Some(c.test.clone());
                meta.result = Some(c.result.clone());
            }
            None => {
                meta.test = None;
                meta.result = Some(TestResult::missing());
            }
        }
    }

    let variables = column_strings(&core.body, "variable")?;
    let row_types = column_strings(&core.body, "row_type")?;
    let label_row = RowType::Label.as_str();
    let p_values: Vec<Option<f64>> = variables
        .iter()
        .zip(&row_types)
        .map(|(variable, row_type)| {
            if row_type.as_deref() != Some(label_row) {
                return None;
            }
            by_variable
                .get(variable.as_deref()?)
                .and_then(|c| c.result.p_value)
        })
        .collect();
    core.body
        .with_column(Column::new(PVALUE_COLUMN.into(), p_values))?;

    let footnote = footnote_text(computed);
    if core.header_for(PVALUE_COLUMN).is_none() {
        core.header
            .push(HeaderRecord::visible(PVALUE_COLUMN, PVALUE_HEADER));
    }
    if let Some(header) = core.header_for_mut(PVALUE_COLUMN) {
        header.label = PVALUE_HEADER.to_string();
        header.hide = false;
        header.formatter = Some(formatter);
        header.footnote = footnote;
    }
    Ok(())
}

/// Distinct test labels in first-use order, joined with `"; "`.
pub(crate) fn footnote_text(computed: &[Computed]) -> Option<String> {
    let mut labels: Vec<&str> = Vec::new();
    for label in computed.iter().filter_map(|c| c.result.label.as_deref()) {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    (!labels.is_empty()).then(|| labels.join("; "))
}

/// Move the single cross-table test into a source note and hide the
/// `p.value` column. Its values stay in the body.
pub(crate) fn move_to_source_note(
    core: &mut TableCore,
    computed: &[Computed],
    formatter: &PvalueFormatter,
) {
    if let Some(c) = computed.first() {
        let p = c
            .result
            .p_value
            .map_or_else(String::new, |p| formatter.format(p));
        let note = match c.result.label.as_deref() {
            Some(label) => format!("{label}, {p}"),
            None => p,
        };
        core.source_notes.push(note);
    }
    if let Some(header) = core.header_for_mut(PVALUE_COLUMN) {
        header.hide = true;
        header.footnote = None;
    }
}

/// Append the audit record of this call.
pub(crate) fn record_call(core: &mut TableCore, arguments: Vec<(String, String)>) {
    core.calls.push(CallRecord::new("add_p", arguments));
}
