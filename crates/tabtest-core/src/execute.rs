//! Run the assigned tests and normalise their results.

use polars::prelude::DataFrame;
use rayon::prelude::*;
use tabtest_model::{DesignSpec, OnError, TestResult};
use tabtest_stats::{
    chisq_test, fisher_exact, kruskal_wallis, mcnemar_test, one_way_anova, paired_t_test,
    random_intercept_lrt, svy_chisq, svy_rank_test, svy_t_test, t_test, wilcoxon_rank_sum,
    wilcoxon_signed_rank, SurveyDesign, TestOutcome,
};
use tracing::warn;

use crate::assign::{AssignedTest, Assignment};
use crate::custom::{validate_output, CustomTestInput};
use crate::error::{AddPError, Result, TestFailure};
use crate::registry::{Method, TestSpec};
use crate::slice::{CategoricalSlice, ClusteredSlice, ContinuousSlice, PairedSlice, SurveySlice};

/// Shared, read-only inputs of every test in one call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecContext<'a> {
    pub data: &'a DataFrame,
    pub design: Option<&'a DesignSpec>,
    /// Statistics-side design, for survey tables.
    pub survey: Option<&'a SurveyDesign>,
    pub by: &'a str,
    pub group: Option<&'a str>,
    pub parallel: bool,
    pub on_error: OnError,
}

/// A variable's test id and result, ready to merge.
#[derive(Debug, Clone)]
pub(crate) struct Computed {
    pub variable: String,
    pub test: String,
    pub result: TestResult,
}

/// Run every assignment. Results come back in assignment order.
pub(crate) fn execute_all(ctx: &ExecContext<'_>, assignments: &[Assignment]) -> Result<Vec<Computed>> {
    let results: Vec<Result<TestResult>> = if ctx.parallel {
        assignments.par_iter().map(|a| execute_one(ctx, a)).collect()
    } else {
        assignments.iter().map(|a| execute_one(ctx, a)).collect()
    };

    assignments
        .iter()
        .zip(results)
        .map(|(assignment, result)| {
            let result = match result {
                Ok(result) => result,
                Err(err @ AddPError::Execution { .. }) if ctx.on_error == OnError::Isolate => {
                    warn!(variable = %assignment.variable, error = %err, "test failed; p-value left missing");
                    TestResult::missing()
                }
                Err(err) => return Err(err),
            };
            Ok(Computed {
                variable: assignment.variable.clone(),
                test: assignment.test.id().to_string(),
                result,
            })
        })
        .collect()
}

fn execute_one(ctx: &ExecContext<'_>, assignment: &Assignment) -> Result<TestResult> {
    let failed = |source: TestFailure| AddPError::Execution {
        variable: assignment.variable.clone(),
        test: assignment.test.id().to_string(),
        source,
    };
    match &assignment.test {
        AssignedTest::Builtin(spec) => {
            let outcome = run_builtin(ctx, spec, assignment).map_err(failed)?;
            for warning in &outcome.warnings {
                warn!(variable = %assignment.variable, test = spec.id, "{warning}");
            }
            Ok(builtin_result(spec, outcome))
        }
        AssignedTest::Custom(custom) => {
            let input = CustomTestInput {
                data: ctx.data,
                design: ctx.design,
                variable: &assignment.variable,
                by: ctx.by,
                group: ctx.group,
                summary_type: assignment.summary_type,
                args: &assignment.args,
            };
            let output = custom
                .call(&input)
                .map_err(|e| failed(TestFailure::Custom(e.to_string())))?;
            validate_output(&assignment.variable, custom.name(), &output)
        }
    }
}

/// Normalise a routine's outcome: a NaN p-value becomes missing and the
/// routine's own method text replaces the registry label where it
/// reflects the arguments used.
pub(crate) fn builtin_result(spec: &TestSpec, outcome: TestOutcome) -> TestResult {
    let label = match outcome.method {
        Some(method) if spec.label_from_method => Some(method),
        _ => spec.label.map(str::to_string),
    };
    TestResult {
        p_value: (!outcome.p_value.is_nan()).then_some(outcome.p_value),
        label,
        statistic: outcome.statistic,
        parameter: outcome.parameter,
    }
}

fn group_column<'a>(ctx: &ExecContext<'a>) -> std::result::Result<&'a str, TestFailure> {
    ctx.group
        .ok_or_else(|| TestFailure::Data("no correlation group was given".to_string()))
}

fn survey_base<'a>(ctx: &ExecContext<'a>) -> std::result::Result<&'a SurveyDesign, TestFailure> {
    ctx.survey
        .ok_or_else(|| TestFailure::Data("survey tests need a survey design".to_string()))
}

fn run_builtin(
    ctx: &ExecContext<'_>,
    spec: &TestSpec,
    assignment: &Assignment,
) -> std::result::Result<TestOutcome, TestFailure> {
    let data = ctx.data;
    let variable = assignment.variable.as_str();
    let args = &assignment.args;
    let continuous = assignment.summary_type.is_continuous();

    let outcome = match spec.method {
        Method::TTest => {
            let slice = ContinuousSlice::new(data, variable, ctx.by)?;
            let (x, y) = slice.two(spec.id)?;
            t_test(x, y, args.bool_or("var_equal", false)?)?
        }
        Method::Anova => one_way_anova(&ContinuousSlice::new(data, variable, ctx.by)?.groups)?,
        Method::KruskalWallis => {
            kruskal_wallis(&ContinuousSlice::new(data, variable, ctx.by)?.groups)?
        }
        Method::WilcoxonRankSum => {
            let slice = ContinuousSlice::new(data, variable, ctx.by)?;
            let (x, y) = slice.two(spec.id)?;
            wilcoxon_rank_sum(x, y, args.bool_or("correct", true)?, args.bool_opt("exact")?)?
        }
        Method::ChiSquared { correct } => {
            chisq_test(&CategoricalSlice::new(data, variable, ctx.by)?.table()?, correct)?
        }
        Method::FisherExact => fisher_exact(&CategoricalSlice::new(data, variable, ctx.by)?.table()?)?,
        Method::McNemar => {
            let pairs = PairedSlice::new(data, variable, ctx.by, group_column(ctx)?, spec.id)?;
            mcnemar_test(&pairs.square_table(), args.bool_or("correct", true)?)?
        }
        Method::PairedT => {
            let pairs = PairedSlice::new(data, variable, ctx.by, group_column(ctx)?, spec.id)?;
            let (x, y) = pairs.numeric(spec.id)?;
            paired_t_test(&x, &y)?
        }
        Method::PairedWilcoxon => {
            let pairs = PairedSlice::new(data, variable, ctx.by, group_column(ctx)?, spec.id)?;
            let (x, y) = pairs.numeric(spec.id)?;
            wilcoxon_signed_rank(&x, &y, args.bool_or("correct", true)?, args.bool_opt("exact")?)?
        }
        Method::RandomIntercept => {
            let slice =
                ClusteredSlice::new(data, variable, continuous, ctx.by, group_column(ctx)?)?;
            random_intercept_lrt(&slice.outcome, &slice.covariates, &slice.clusters)?
        }
        Method::SurveyT => {
            let slice = SurveySlice::new(data, variable, true, ctx.by, survey_base(ctx)?)?;
            svy_t_test(&slice.values, &slice.groups, &slice.design)?
        }
        Method::SurveyRank(score) => {
            let slice = SurveySlice::new(data, variable, true, ctx.by, survey_base(ctx)?)?;
            svy_rank_test(&slice.values, &slice.groups, &slice.design, score)?
        }
        Method::SurveyChisq(statistic) => {
            let slice = SurveySlice::new(data, variable, false, ctx.by, survey_base(ctx)?)?;
            svy_chisq(&slice.codes, &slice.groups, &slice.design, statistic)?
        }
        Method::SurvDiff { .. } | Method::Cox(_) => {
            return Err(TestFailure::Data(format!(
                "`{}` runs on survival fits, not on a flat dataset",
                spec.id
            )));
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lookup;
    use tabtest_model::TableKind;

    #[test]
    fn nan_p_value_is_missing() {
        let spec = lookup(TableKind::Summary, "aov").unwrap();
        let result = builtin_result(
            spec,
            TestOutcome {
                p_value: f64::NAN,
                ..TestOutcome::default()
            },
        );
        assert_eq!(result.p_value, None);
        assert_eq!(result.label.as_deref(), Some("One-way ANOVA"));
    }

    #[test]
    fn method_text_replaces_label_when_flagged() {
        let spec = lookup(TableKind::Summary, "t.test").unwrap();
        let outcome = TestOutcome {
            p_value: 0.2,
            method: Some("Two Sample t-test".to_string()),
            ..TestOutcome::default()
        };
        assert_eq!(
            builtin_result(spec, outcome.clone()).label.as_deref(),
            Some("Two Sample t-test")
        );

        let fisher = lookup(TableKind::Summary, "fisher.test").unwrap();
        assert_eq!(
            builtin_result(fisher, outcome).label.as_deref(),
            Some("Fisher's exact test")
        );
    }
}
