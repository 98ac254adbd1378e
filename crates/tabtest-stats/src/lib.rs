//! Hypothesis tests for comparing variables across the groups of a
//! summary table.
//!
//! Every routine works on plain slices and returns a [`TestOutcome`]; data
//! frame handling lives in the calling crates.

pub mod continuous;
pub mod contingency;
pub mod cox;
pub mod dist;
pub mod error;
pub mod linalg;
pub mod mixed;
pub mod optim;
pub mod paired;
pub mod rank;
pub mod survey;
pub mod survival;

pub use contingency::{chisq_test, fisher_exact, ContingencyTable};
pub use continuous::{kruskal_wallis, one_way_anova, t_test, wilcoxon_rank_sum};
pub use cox::{cox_tests, CoxTests, Ties};
pub use error::{Result, StatsError};
pub use mixed::random_intercept_lrt;
pub use paired::{mcnemar_test, paired_t_test, wilcoxon_signed_rank};
pub use survey::{svy_chisq, svy_rank_test, svy_t_test, ChisqStatistic, RankScore, SurveyDesign};
pub use survival::{survdiff, SurvDiff};

/// Result of a single hypothesis test.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestOutcome {
    /// Test statistic, if the test has one.
    pub statistic: Option<f64>,
    /// Degrees of freedom (numerator df for F tests).
    pub parameter: Option<f64>,
    /// Two-sided p-value. `NaN` when the statistic is undefined.
    pub p_value: f64,
    /// Description of the procedure as actually run.
    pub method: Option<String>,
    /// Non-fatal diagnostics raised while computing the test.
    pub warnings: Vec<String>,
}
