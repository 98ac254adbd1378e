//! Entry points: one augmentation per table kind, sharing the resolver,
//! execution and merge stages.
//!
//! Every call works on a copy of the table. An error at any stage returns
//! before the copy is handed back, so the caller's table is never partly
//! updated.

use polars::prelude::DataFrame;
use tabtest_model::{
    CrossTable, GtTable, PvalueFormatter, SummaryTable, SummaryType, SurveyTable, SurvivalTable,
    TabConfig, TableCore, TableKind,
};
use tracing::{debug, info_span};

use crate::assign::{included_variables, resolve, Assignment, ResolveContext};
use crate::error::{AddPError, Result};
use crate::execute::{execute_all, Computed, ExecContext};
use crate::merge::{merge_results, move_to_source_note, record_call};
use crate::options::AddPOptions;
use crate::slice::survey_design;
use crate::survival::{execute_survival, missing_fit, DiagnosticGate};

/// Stage of an augmentation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Resolving,
    Executing,
    Merging,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Resolving => "resolving",
            Self::Executing => "executing",
            Self::Merging => "merging",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

struct CallState {
    phase: Phase,
}

impl CallState {
    fn advance(&mut self, next: Phase) {
        debug!(from = self.phase.as_str(), to = next.as_str(), "add_p state");
        self.phase = next;
    }
}

fn run_call<T>(kind: TableKind, body: impl FnOnce(&mut CallState) -> Result<T>) -> Result<T> {
    let span = info_span!("add_p", kind = kind.as_str());
    let _guard = span.enter();
    let mut state = CallState {
        phase: Phase::Validating,
    };
    let result = body(&mut state);
    match &result {
        Ok(_) => state.advance(Phase::Done),
        Err(err) => {
            debug!(phase = state.phase.as_str(), error = %err, "add_p failed");
            state.advance(Phase::Failed);
        }
    }
    result
}

/// Add a p-value to every testable variable of `table`.
pub fn add_p(table: &GtTable, options: &AddPOptions, config: &TabConfig) -> Result<GtTable> {
    match table {
        GtTable::Summary(t) => add_p_summary(t, options, config).map(GtTable::Summary),
        GtTable::Cross(t) => add_p_cross(t, options, config).map(GtTable::Cross),
        GtTable::Survey(t) => add_p_survey(t, options, config).map(GtTable::Survey),
        GtTable::Survival(t) => add_p_survival(t, options, config).map(GtTable::Survival),
    }
}

pub fn add_p_summary(
    table: &SummaryTable,
    options: &AddPOptions,
    config: &TabConfig,
) -> Result<SummaryTable> {
    run_call(TableKind::Summary, |state| {
        let core = augment_flat(TableKind::Summary, &table.core, &table.data, None, options, config, state)?;
        Ok(SummaryTable {
            core,
            data: table.data.clone(),
        })
    })
}

pub fn add_p_cross(
    table: &CrossTable,
    options: &AddPOptions,
    config: &TabConfig,
) -> Result<CrossTable> {
    run_call(TableKind::Cross, |state| {
        let core = augment_flat(TableKind::Cross, &table.core, &table.data, None, options, config, state)?;
        Ok(CrossTable {
            core,
            data: table.data.clone(),
            row_var: table.row_var.clone(),
        })
    })
}

pub fn add_p_survey(
    table: &SurveyTable,
    options: &AddPOptions,
    config: &TabConfig,
) -> Result<SurveyTable> {
    run_call(TableKind::Survey, |state| {
        let core = augment_flat(
            TableKind::Survey,
            &table.core,
            &table.design.data,
            Some(&table.design),
            options,
            config,
            state,
        )?;
        Ok(SurveyTable {
            core,
            design: table.design.clone(),
        })
    })
}

pub fn add_p_survival(
    table: &SurvivalTable,
    options: &AddPOptions,
    config: &TabConfig,
) -> Result<SurvivalTable> {
    run_call(TableKind::Survival, |state| {
        if !table.core.meta.iter().any(|m| m.stratified) {
            return Err(AddPError::MissingBy);
        }
        if options.group.is_some() {
            return Err(AddPError::InvalidArgument {
                argument: "group",
                reason: "survival tables do not take a correlation group".to_string(),
            });
        }
        check_source_note(TableKind::Survival, options)?;
        let formatter = pvalue_formatter(options, config)?;

        let variables: Vec<(String, SummaryType)> = table
            .core
            .meta
            .iter()
            .filter(|m| m.stratified)
            .map(|m| (m.variable.clone(), m.summary_type))
            .collect();
        if let Some((variable, _)) = variables
            .iter()
            .find(|(v, _)| !table.fits.iter().any(|f| &f.variable == v))
        {
            return Err(missing_fit(variable));
        }
        let ctx = ResolveContext {
            kind: TableKind::Survival,
            data: None,
            by: "",
            variables: &variables,
        };
        let gate = DiagnosticGate::new();
        let core = augment(&table.core, &ctx, options, config, formatter, state, |assignments| {
            execute_survival(&table.fits, assignments, options.quiet, config.on_error, &gate)
        })?;
        Ok(SurvivalTable {
            core,
            fits: table.fits.clone(),
        })
    })
}

fn check_source_note(kind: TableKind, options: &AddPOptions) -> Result<()> {
    if options.source_note && kind != TableKind::Cross {
        return Err(AddPError::InvalidArgument {
            argument: "source_note",
            reason: format!("only cross tables can report the test in a source note, not a {kind} table"),
        });
    }
    Ok(())
}

fn pvalue_formatter(options: &AddPOptions, config: &TabConfig) -> Result<PvalueFormatter> {
    let formatter = match &options.pvalue_fun {
        Some(formatter) => Ok(formatter.clone()),
        None if options.source_note => config.pvalue.note_formatter(),
        None => config.pvalue.formatter(),
    };
    formatter.map_err(|err| AddPError::InvalidArgument {
        argument: "pvalue_fun",
        reason: err.to_string(),
    })
}

fn require_column(data: &DataFrame, argument: &'static str, column: &str) -> Result<()> {
    if data.column(column).is_err() {
        return Err(AddPError::InvalidArgument {
            argument,
            reason: format!("column `{column}` is not in the data"),
        });
    }
    Ok(())
}

/// Summary, cross and survey tables: validate, then resolve and run the
/// tests against the flat data (or the design's data).
fn augment_flat(
    kind: TableKind,
    core: &TableCore,
    data: &DataFrame,
    design: Option<&tabtest_model::DesignSpec>,
    options: &AddPOptions,
    config: &TabConfig,
    state: &mut CallState,
) -> Result<TableCore> {
    let by = core.by.as_deref().ok_or(AddPError::MissingBy)?;
    require_column(data, "by", by)?;
    if let Some(group) = options.group.as_deref() {
        require_column(data, "group", group)?;
        if group == by {
            return Err(AddPError::InvalidArgument {
                argument: "group",
                reason: format!("the correlation group cannot be the `by` variable `{by}`"),
            });
        }
    }
    check_source_note(kind, options)?;
    let formatter = pvalue_formatter(options, config)?;
    let survey = design
        .map(survey_design)
        .transpose()
        .map_err(|err| AddPError::InvalidArgument {
            argument: "design",
            reason: err.to_string(),
        })?;

    let variables = core.variable_types();
    let ctx = ResolveContext {
        kind,
        data: Some(data),
        by,
        variables: &variables,
    };
    let exec = ExecContext {
        data,
        design,
        survey: survey.as_ref(),
        by,
        group: options.group.as_deref(),
        parallel: config.parallel,
        on_error: config.on_error,
    };
    augment(core, &ctx, options, config, formatter, state, |assignments| {
        execute_all(&exec, assignments)
    })
}

/// Resolve, execute and merge into a copy of `core`.
fn augment(
    core: &TableCore,
    ctx: &ResolveContext<'_>,
    options: &AddPOptions,
    config: &TabConfig,
    formatter: PvalueFormatter,
    state: &mut CallState,
    execute: impl FnOnce(&[Assignment]) -> Result<Vec<Computed>>,
) -> Result<TableCore> {
    state.advance(Phase::Resolving);
    let assignments = info_span!("resolve").in_scope(|| -> Result<Vec<Assignment>> {
        let included = included_variables(ctx, options)?;
        resolve(ctx, options, config, &included)
    })?;

    state.advance(Phase::Executing);
    let computed = info_span!("execute", tests = assignments.len()).in_scope(|| execute(&assignments))?;

    state.advance(Phase::Merging);
    info_span!("merge").in_scope(|| {
        let mut core = core.clone();
        merge_results(&mut core, &computed, formatter.clone())?;
        if options.source_note {
            move_to_source_note(&mut core, &computed, &formatter);
        }
        record_call(&mut core, options.audit_arguments());
        Ok(core)
    })
}
