//! Tests for survival-curve tables.
//!
//! Each stratified fit is re-tested with a model call built from the fit's
//! formula and data. The first call is logged so the output can be
//! reproduced; diagnostics from later fits are demoted to `debug`.

use std::sync::atomic::{AtomicBool, Ordering};

use tabtest_common::{column_f64, column_strings, sorted_levels};
use tabtest_model::{OnError, SurvFit, TableKind, TestArgs, TestResult};
use tabtest_stats::cox::dummy_columns;
use tabtest_stats::{cox_tests, survdiff, TestOutcome, Ties};
use tracing::{debug, info, warn};

use crate::assign::{AssignedTest, Assignment};
use crate::error::{AddPError, Result, TestFailure};
use crate::execute::{builtin_result, Computed};
use crate::registry::{CoxStatistic, Method, TestSpec};

/// Marks the first of a sequence of calls.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticGate {
    used: AtomicBool,
}

impl DiagnosticGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once.
    pub fn first(&self) -> bool {
        !self.used.swap(true, Ordering::SeqCst)
    }
}

struct SurvData {
    time: Vec<f64>,
    status: Vec<f64>,
    groups: Vec<usize>,
    ngroups: usize,
}

fn survival_data(fit: &SurvFit) -> std::result::Result<SurvData, TestFailure> {
    let strata = fit.formula.strata.as_deref().ok_or_else(|| {
        TestFailure::Data(format!("fit `{}` is not stratified", fit.variable))
    })?;
    let times = column_f64(&fit.data, &fit.formula.time)?;
    let statuses = column_f64(&fit.data, &fit.formula.status)?;
    let strata_values = column_strings(&fit.data, strata)?;
    let levels = sorted_levels(&strata_values);

    let mut data = SurvData {
        time: Vec::new(),
        status: Vec::new(),
        groups: Vec::new(),
        ngroups: levels.len(),
    };
    for ((t, s), g) in times.iter().zip(&statuses).zip(&strata_values) {
        let level = g
            .as_ref()
            .and_then(|g| levels.iter().position(|l| l == g));
        if let (Some(t), Some(s), Some(level)) = (t, s, level) {
            data.time.push(*t);
            data.status.push(if *s > 0.0 { 1.0 } else { 0.0 });
            data.groups.push(level);
        }
    }
    Ok(data)
}

/// The model call a test stands for, e.g.
/// `survdiff(formula = Surv(time, status) ~ trt, data = data, rho = 0)`.
pub(crate) fn render_call(spec: &TestSpec, fit: &SurvFit, args: &TestArgs) -> String {
    let mut parts = vec![
        format!("formula = {}", fit.formula.render()),
        "data = data".to_string(),
    ];
    let function = match spec.method {
        Method::SurvDiff { rho } => {
            match rho {
                Some(rho) => parts.push(format!("rho = {rho}")),
                None if !args.is_empty() => parts.push(args.to_string()),
                None => {}
            }
            "survdiff"
        }
        Method::Cox(_) => {
            if !args.is_empty() {
                parts.push(args.to_string());
            }
            "coxph"
        }
        _ => spec.id,
    };
    format!("{function}({})", parts.join(", "))
}

fn run_model(
    spec: &TestSpec,
    fit: &SurvFit,
    args: &TestArgs,
) -> std::result::Result<TestOutcome, TestFailure> {
    let data = survival_data(fit)?;
    match spec.method {
        Method::SurvDiff { rho } => {
            let rho = match rho {
                Some(rho) => rho,
                None => args.number_or("rho", 0.0)?,
            };
            Ok(survdiff(&data.time, &data.status, &data.groups, data.ngroups, rho)?.outcome)
        }
        Method::Cox(statistic) => {
            let ties: Ties = args.text_or("ties", "efron")?.parse()?;
            let x = dummy_columns(&data.groups, data.ngroups);
            let tests = cox_tests(&data.time, &data.status, &x, ties)?;
            Ok(match statistic {
                CoxStatistic::LikelihoodRatio => tests.likelihood_ratio,
                CoxStatistic::Wald => tests.wald,
                CoxStatistic::Score => tests.score,
            })
        }
        _ => Err(TestFailure::Data(format!(
            "`{}` is not a survival test",
            spec.id
        ))),
    }
}

/// Pair each assignment with its built-in test and stratified fit.
fn pair_fits<'a>(
    fits: &'a [SurvFit],
    assignments: &'a [Assignment],
) -> Result<Vec<(&'a Assignment, &'static TestSpec, &'a SurvFit)>> {
    assignments
        .iter()
        .map(|assignment| {
            let variable = assignment.variable.as_str();
            let AssignedTest::Builtin(spec) = &assignment.test else {
                return Err(AddPError::UnknownTest {
                    variable: variable.to_string(),
                    test: assignment.test.id().to_string(),
                    kind: TableKind::Survival,
                });
            };
            let fit = fits
                .iter()
                .find(|f| f.variable == variable)
                .ok_or_else(|| missing_fit(variable))?;
            Ok((assignment, *spec, fit))
        })
        .collect()
}

pub(crate) fn missing_fit(variable: &str) -> AddPError {
    AddPError::InvalidArgument {
        argument: "include",
        reason: format!("no stratified fit for `{variable}`"),
    }
}

/// Model diagnostics go to `warn` for the first fit and `debug` after it.
fn report_diagnostics(first: bool, variable: &str, test: &str, warnings: &[String]) {
    for warning in warnings {
        if first {
            warn!(variable, test, "{warning}");
        } else {
            debug!(variable, test, "{warning}");
        }
    }
}

/// Run the survival tests one fit at a time, in table order.
pub(crate) fn execute_survival(
    fits: &[SurvFit],
    assignments: &[Assignment],
    quiet: bool,
    on_error: OnError,
    gate: &DiagnosticGate,
) -> Result<Vec<Computed>> {
    let paired = pair_fits(fits, assignments)?;
    let mut computed = Vec::with_capacity(paired.len());
    for (assignment, spec, fit) in paired {
        let variable = assignment.variable.as_str();
        let first = gate.first();
        if first && !quiet {
            info!(
                "add_p: calculating p-values with `{}`",
                render_call(spec, fit, &assignment.args)
            );
        }

        let result = match run_model(spec, fit, &assignment.args) {
            Ok(outcome) => {
                report_diagnostics(first, variable, spec.id, &outcome.warnings);
                builtin_result(spec, outcome)
            }
            Err(source) => {
                let err = AddPError::Execution {
                    variable: variable.to_string(),
                    test: spec.id.to_string(),
                    source,
                };
                if on_error == OnError::Abort {
                    return Err(err);
                }
                warn!(variable, error = %err, "test failed; p-value left missing");
                TestResult::missing()
            }
        };

        computed.push(Computed {
            variable: variable.to_string(),
            test: spec.id.to_string(),
            result,
        });
    }
    Ok(computed)
}
