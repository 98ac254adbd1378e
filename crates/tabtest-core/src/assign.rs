//! Decide which test each variable gets.
//!
//! An explicit override (last matching entry wins) takes precedence over
//! the data-driven default. Every assignment is validated against the
//! registry before anything runs.

use polars::prelude::DataFrame;
use tabtest_model::{SummaryType, TabConfig, TableKind, TestArgs};
use tracing::{debug, warn};

use crate::custom::CustomTest;
use crate::error::{AddPError, Result};
use crate::options::{AddPOptions, TestChoice};
use crate::registry::{lookup, TestSpec};
use crate::slice::{levels, CategoricalSlice};

/// The resolved test of a variable.
#[derive(Debug, Clone)]
pub enum AssignedTest {
    Builtin(&'static TestSpec),
    Custom(CustomTest),
}

impl AssignedTest {
    pub fn id(&self) -> &str {
        match self {
            Self::Builtin(spec) => spec.id,
            Self::Custom(custom) => custom.name(),
        }
    }
}

/// One variable's test and the extra arguments it runs with.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub variable: String,
    pub summary_type: SummaryType,
    pub test: AssignedTest,
    pub args: TestArgs,
}

/// What the resolver needs to know about the table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolveContext<'a> {
    pub kind: TableKind,
    /// Data for the default rule; `None` when defaults need no data.
    pub data: Option<&'a DataFrame>,
    pub by: &'a str,
    /// `(variable, summary type)` of every testable variable, in table order.
    pub variables: &'a [(String, SummaryType)],
}

/// Variables that receive a test: `include` (default everything) minus the
/// deprecated `exclude`.
pub(crate) fn included_variables(
    ctx: &ResolveContext<'_>,
    options: &AddPOptions,
) -> Result<Vec<String>> {
    let mut included = match &options.include {
        Some(selector) => selector
            .resolve(ctx.variables)
            .map_err(|source| AddPError::Selector {
                argument: "include",
                source,
            })?,
        None => ctx.variables.iter().map(|(v, _)| v.clone()).collect(),
    };
    if let Some(exclude) = &options.exclude {
        warn!(
            "the `exclude` argument is deprecated; use a negated `include` such as `-{}` instead",
            exclude
        );
        let excluded = exclude
            .resolve(ctx.variables)
            .map_err(|source| AddPError::Selector {
                argument: "exclude",
                source,
            })?;
        included.retain(|v| !excluded.contains(v));
    }
    Ok(included)
}

/// Resolve and validate one assignment per included variable.
pub(crate) fn resolve(
    ctx: &ResolveContext<'_>,
    options: &AddPOptions,
    config: &TabConfig,
    included: &[String],
) -> Result<Vec<Assignment>> {
    let overrides = resolve_selectors(ctx, &options.tests, "test")?;
    let arg_sets = resolve_selectors(ctx, &options.test_args, "test.args")?;

    let mut assignments = Vec::with_capacity(included.len());
    for (variable, summary_type) in ctx.variables {
        if !included.contains(variable) {
            continue;
        }
        let choice = overrides
            .iter()
            .rev()
            .find(|(vars, _)| vars.contains(variable))
            .map(|(_, choice)| (*choice).clone());
        let choice = match choice {
            Some(choice) => choice,
            None => TestChoice::Builtin(default_test(
                ctx,
                options.group.as_deref(),
                config,
                variable,
                *summary_type,
            )?),
        };

        let mut args = TestArgs::new();
        for (vars, set) in &arg_sets {
            if vars.contains(variable) {
                for name in set.names() {
                    if let Some(value) = set.get(name) {
                        args.insert(name, value.clone());
                    }
                }
            }
        }

        let test = validate(ctx, options, variable, *summary_type, choice, &args)?;
        debug!(variable = %variable, test = test.id(), "assigned test");
        assignments.push(Assignment {
            variable: variable.clone(),
            summary_type: *summary_type,
            test,
            args,
        });
    }
    Ok(assignments)
}

fn resolve_selectors<'o, T>(
    ctx: &ResolveContext<'_>,
    entries: &'o [(tabtest_model::Selector, T)],
    argument: &'static str,
) -> Result<Vec<(Vec<String>, &'o T)>> {
    entries
        .iter()
        .map(|(selector, value)| {
            let vars = selector
                .resolve(ctx.variables)
                .map_err(|source| AddPError::Selector { argument, source })?;
            Ok((vars, value))
        })
        .collect()
}

fn validate(
    ctx: &ResolveContext<'_>,
    options: &AddPOptions,
    variable: &str,
    summary_type: SummaryType,
    choice: TestChoice,
    args: &TestArgs,
) -> Result<AssignedTest> {
    let spec = match choice {
        TestChoice::Custom(custom) if ctx.kind != TableKind::Survival => {
            return Ok(AssignedTest::Custom(custom));
        }
        TestChoice::Custom(custom) => {
            return Err(AddPError::UnknownTest {
                variable: variable.to_string(),
                test: custom.name().to_string(),
                kind: ctx.kind,
            });
        }
        TestChoice::Builtin(id) => {
            lookup(ctx.kind, &id).ok_or_else(|| AddPError::UnknownTest {
                variable: variable.to_string(),
                test: id.clone(),
                kind: ctx.kind,
            })?
        }
    };

    if !spec.applies.accepts(summary_type) {
        return Err(AddPError::TestNotApplicable {
            variable: variable.to_string(),
            test: spec.id.to_string(),
            summary_type,
        });
    }
    if !args.is_empty() {
        if !spec.accepts_args() {
            return Err(AddPError::ArgsNotAccepted {
                variable: variable.to_string(),
                test: spec.id.to_string(),
                args: args.to_string(),
            });
        }
        if let Some(unknown) = args.names().find(|n| !spec.arg_names.contains(n)) {
            return Err(AddPError::InvalidArgument {
                argument: "test.args",
                reason: format!(
                    "`{}` does not take `{unknown}` (accepted: {})",
                    spec.id,
                    spec.arg_names.join(", ")
                ),
            });
        }
    }
    if spec.needs_group && options.group.is_none() {
        return Err(AddPError::InvalidArgument {
            argument: "group",
            reason: format!("test `{}` requires a correlation group", spec.id),
        });
    }
    Ok(AssignedTest::Builtin(spec))
}

fn default_test(
    ctx: &ResolveContext<'_>,
    group: Option<&str>,
    config: &TabConfig,
    variable: &str,
    summary_type: SummaryType,
) -> Result<String> {
    let defaults = &config.tests;
    match ctx.kind {
        TableKind::Survival => return Ok(defaults.survival.clone()),
        TableKind::Survey => {
            return Ok(if summary_type.is_continuous() {
                defaults.survey_continuous.clone()
            } else {
                defaults.survey_categorical.clone()
            });
        }
        TableKind::Summary | TableKind::Cross => {}
    }

    let data = ctx.data.ok_or_else(|| AddPError::InvalidArgument {
        argument: "data",
        reason: "the table does not carry its source data".to_string(),
    })?;

    if group.is_some() {
        let n = levels(data, ctx.by)?.len();
        if n != 2 {
            return Err(AddPError::InvalidArgument {
                argument: "group",
                reason: format!(
                    "a correlation group requires `{}` to have exactly 2 levels, found {n}",
                    ctx.by
                ),
            });
        }
        return Ok(defaults.grouped.clone());
    }

    if summary_type.is_continuous() {
        let n = levels(data, ctx.by)?.len();
        return Ok(if n == 2 {
            defaults.continuous_by2.clone()
        } else {
            defaults.continuous.clone()
        });
    }

    let slice = CategoricalSlice::new(data, variable, ctx.by)?;
    let min_expected = slice.table().map_or(0.0, |t| t.min_expected());
    Ok(if min_expected < config.min_expected {
        defaults.categorical_low_count.clone()
    } else {
        defaults.categorical.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;
    use tabtest_model::{ArgValue, Selector};

    fn data() -> DataFrame {
        DataFrame::new(vec![
            Column::new("trt".into(), vec!["A", "A", "A", "B", "B", "B"]),
            Column::new("age".into(), vec![30.0, 41.0, 52.0, 33.0, 45.0, 60.0]),
            Column::new("sex".into(), vec!["F", "F", "M", "F", "M", "M"]),
        ])
        .unwrap()
    }

    fn variables() -> Vec<(String, SummaryType)> {
        vec![
            ("age".to_string(), SummaryType::Continuous),
            ("sex".to_string(), SummaryType::Dichotomous),
        ]
    }

    fn run(options: &AddPOptions) -> Result<Vec<Assignment>> {
        let df = data();
        let vars = variables();
        let ctx = ResolveContext {
            kind: TableKind::Summary,
            data: Some(&df),
            by: "trt",
            variables: &vars,
        };
        let included = included_variables(&ctx, options)?;
        resolve(&ctx, options, &TabConfig::default(), &included)
    }

    fn ids(assignments: &[Assignment]) -> Vec<(&str, &str)> {
        assignments
            .iter()
            .map(|a| (a.variable.as_str(), a.test.id()))
            .collect()
    }

    #[test]
    fn defaults_follow_type_and_counts() {
        let assignments = run(&AddPOptions::new()).unwrap();
        assert_eq!(
            ids(&assignments),
            vec![("age", "wilcox.test"), ("sex", "fisher.test")]
        );
    }

    #[test]
    fn last_matching_override_wins() {
        let options = AddPOptions::new()
            .test(Selector::everything(), "fisher.test")
            .test(Selector::parse("all_continuous()").unwrap(), "t.test");
        let assignments = run(&options).unwrap();
        assert_eq!(
            ids(&assignments),
            vec![("age", "t.test"), ("sex", "fisher.test")]
        );
    }

    #[test]
    fn unknown_and_inapplicable_tests_fail() {
        let unknown = AddPOptions::new().test(Selector::names(&["age"]), "no.such.test");
        assert!(matches!(run(&unknown), Err(AddPError::UnknownTest { .. })));

        let wrong = AddPOptions::new().test(Selector::names(&["sex"]), "t.test");
        assert!(matches!(
            run(&wrong),
            Err(AddPError::TestNotApplicable { .. })
        ));
    }

    #[test]
    fn args_checked_against_registry() {
        let forbidden = AddPOptions::new().test_args(
            Selector::names(&["sex"]),
            TestArgs::new().with("correct", ArgValue::Bool(false)),
        );
        assert!(matches!(
            run(&forbidden),
            Err(AddPError::ArgsNotAccepted { .. })
        ));

        let misspelt = AddPOptions::new().test_args(
            Selector::names(&["age"]),
            TestArgs::new().with("corect", ArgValue::Bool(false)),
        );
        assert!(matches!(
            run(&misspelt),
            Err(AddPError::InvalidArgument {
                argument: "test.args",
                ..
            })
        ));
    }

    #[test]
    fn exclusion_removes_variables() {
        let options = AddPOptions::new().include(Selector::parse("-sex").unwrap());
        assert_eq!(ids(&run(&options).unwrap()), vec![("age", "wilcox.test")]);

        let legacy = AddPOptions::new().exclude(Selector::names(&["age"]));
        assert_eq!(ids(&run(&legacy).unwrap()), vec![("sex", "fisher.test")]);
    }

    #[test]
    fn paired_test_needs_group() {
        let options = AddPOptions::new().test(Selector::names(&["age"]), "paired.t.test");
        assert!(matches!(
            run(&options),
            Err(AddPError::InvalidArgument {
                argument: "group",
                ..
            })
        ));
    }
}
