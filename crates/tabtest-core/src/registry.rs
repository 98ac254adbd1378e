//! Built-in tests available to each table kind.

use tabtest_model::{SummaryType, TableKind};
use tabtest_stats::{ChisqStatistic, RankScore};

use self::Applies::{Any, Categorical, Continuous};

/// Summary types a test can be run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applies {
    Continuous,
    Categorical,
    Any,
}

impl Applies {
    pub fn accepts(self, summary_type: SummaryType) -> bool {
        match self {
            Self::Continuous => summary_type.is_continuous(),
            Self::Categorical => summary_type.is_categorical(),
            Self::Any => true,
        }
    }
}

/// Global test reported from a Cox model fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoxStatistic {
    LikelihoodRatio,
    Wald,
    Score,
}

/// The statistics routine a test id is bound to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    TTest,
    Anova,
    KruskalWallis,
    WilcoxonRankSum,
    ChiSquared { correct: bool },
    FisherExact,
    McNemar,
    PairedT,
    PairedWilcoxon,
    RandomIntercept,
    SurveyT,
    SurveyRank(RankScore),
    SurveyChisq(ChisqStatistic),
    /// G-rho test; `None` takes `rho` from the test arguments.
    SurvDiff { rho: Option<f64> },
    Cox(CoxStatistic),
}

/// A built-in test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestSpec {
    pub id: &'static str,
    /// Footnote text. Some survival tests have none.
    pub label: Option<&'static str>,
    pub applies: Applies,
    /// Additional arguments the test understands. Empty means none are
    /// accepted.
    pub arg_names: &'static [&'static str],
    /// Requires a correlation group (`group`).
    pub needs_group: bool,
    /// The routine's own method text replaces `label` (it reflects the
    /// arguments actually used).
    pub label_from_method: bool,
    pub method: Method,
}

impl TestSpec {
    pub fn accepts_args(&self) -> bool {
        !self.arg_names.is_empty()
    }

    const fn new(id: &'static str, label: &'static str, applies: Applies, method: Method) -> Self {
        Self {
            id,
            label: Some(label),
            applies,
            arg_names: &[],
            needs_group: false,
            label_from_method: false,
            method,
        }
    }

    const fn args(mut self, names: &'static [&'static str]) -> Self {
        self.arg_names = names;
        self
    }

    const fn grouped(mut self) -> Self {
        self.needs_group = true;
        self
    }

    const fn method_label(mut self) -> Self {
        self.label_from_method = true;
        self
    }

    const fn no_label(mut self) -> Self {
        self.label = None;
        self
    }
}

static ORDINARY: &[TestSpec] = &[
    TestSpec::new("t.test", "Welch Two Sample t-test", Continuous, Method::TTest)
        .args(&["var_equal"])
        .method_label(),
    TestSpec::new("aov", "One-way ANOVA", Continuous, Method::Anova),
    TestSpec::new(
        "kruskal.test",
        "Kruskal-Wallis rank sum test",
        Continuous,
        Method::KruskalWallis,
    ),
    TestSpec::new(
        "wilcox.test",
        "Wilcoxon rank sum test",
        Continuous,
        Method::WilcoxonRankSum,
    )
    .args(&["correct", "exact"]),
    TestSpec::new(
        "chisq.test",
        "Pearson's Chi-squared test",
        Categorical,
        Method::ChiSquared { correct: true },
    )
    .method_label(),
    TestSpec::new(
        "chisq.test.no.correct",
        "Pearson's Chi-squared test",
        Categorical,
        Method::ChiSquared { correct: false },
    ),
    TestSpec::new(
        "fisher.test",
        "Fisher's exact test",
        Categorical,
        Method::FisherExact,
    ),
    TestSpec::new(
        "mcnemar.test",
        "McNemar's Chi-squared test",
        Categorical,
        Method::McNemar,
    )
    .args(&["correct"])
    .grouped()
    .method_label(),
    TestSpec::new("paired.t.test", "Paired t-test", Continuous, Method::PairedT).grouped(),
    TestSpec::new(
        "paired.wilcox.test",
        "Wilcoxon signed rank test",
        Continuous,
        Method::PairedWilcoxon,
    )
    .args(&["correct", "exact"])
    .grouped(),
    TestSpec::new(
        "lme4",
        "Random intercept logistic regression",
        Any,
        Method::RandomIntercept,
    )
    .grouped(),
];

static SURVEY: &[TestSpec] = &[
    TestSpec::new(
        "svy.t.test",
        "t-test adapted to complex survey samples",
        Continuous,
        Method::SurveyT,
    ),
    TestSpec::new(
        "svy.wilcox.test",
        "Wilcoxon rank-sum test for complex survey samples",
        Continuous,
        Method::SurveyRank(RankScore::Wilcoxon),
    ),
    TestSpec::new(
        "svy.kruskal.test",
        "Kruskal-Wallis rank-sum test for complex survey samples",
        Continuous,
        Method::SurveyRank(RankScore::KruskalWallis),
    ),
    TestSpec::new(
        "svy.vanderwaerden.test",
        "van der Waerden's normal-scores test for complex survey samples",
        Continuous,
        Method::SurveyRank(RankScore::VanDerWaerden),
    ),
    TestSpec::new(
        "svy.median.test",
        "Mood's test for the median for complex survey samples",
        Continuous,
        Method::SurveyRank(RankScore::Median),
    ),
    TestSpec::new(
        "svy.chisq.test",
        "chi-squared test with Rao & Scott's second-order correction",
        Categorical,
        Method::SurveyChisq(ChisqStatistic::SecondOrder),
    ),
    TestSpec::new(
        "svy.adj.chisq.test",
        "chi-squared test adjusted by a design effect estimate",
        Categorical,
        Method::SurveyChisq(ChisqStatistic::FirstOrder),
    ),
    TestSpec::new(
        "svy.wald.test",
        "Wald test of independence for complex survey samples",
        Categorical,
        Method::SurveyChisq(ChisqStatistic::Wald),
    ),
    TestSpec::new(
        "svy.adj.wald.test",
        "adjusted Wald test of independence for complex survey samples",
        Categorical,
        Method::SurveyChisq(ChisqStatistic::AdjustedWald),
    ),
];

static SURVIVAL: &[TestSpec] = &[
    TestSpec::new(
        "logrank",
        "Log-rank test",
        Any,
        Method::SurvDiff { rho: Some(0.0) },
    ),
    TestSpec::new("survdiff", "", Any, Method::SurvDiff { rho: None })
        .no_label()
        .args(&["rho"]),
    TestSpec::new(
        "petopeto_gehanwilcoxon",
        "Peto & Peto modification of Gehan-Wilcoxon test",
        Any,
        Method::SurvDiff { rho: Some(1.0) },
    ),
    TestSpec::new(
        "coxph_lrt",
        "Cox regression (LRT)",
        Any,
        Method::Cox(CoxStatistic::LikelihoodRatio),
    )
    .args(&["ties"]),
    TestSpec::new(
        "coxph_wald",
        "Cox regression (Wald)",
        Any,
        Method::Cox(CoxStatistic::Wald),
    )
    .args(&["ties"]),
    TestSpec::new(
        "coxph_score",
        "Cox regression (Score)",
        Any,
        Method::Cox(CoxStatistic::Score),
    )
    .args(&["ties"]),
];

/// Built-in tests for a table kind. Summary and cross tables share the
/// ordinary tests.
pub fn registry(kind: TableKind) -> &'static [TestSpec] {
    match kind {
        TableKind::Summary | TableKind::Cross => ORDINARY,
        TableKind::Survey => SURVEY,
        TableKind::Survival => SURVIVAL,
    }
}

/// Find a built-in test by id.
pub fn lookup(kind: TableKind, id: &str) -> Option<&'static TestSpec> {
    registry(kind).iter().find(|spec| spec.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_kind() {
        for kind in [TableKind::Summary, TableKind::Survey, TableKind::Survival] {
            let specs = registry(kind);
            for (i, a) in specs.iter().enumerate() {
                assert!(
                    specs[i + 1..].iter().all(|b| b.id != a.id),
                    "duplicate id {}",
                    a.id
                );
            }
        }
    }

    #[test]
    fn survival_argument_flags() {
        let accepts: Vec<(&str, bool)> = registry(TableKind::Survival)
            .iter()
            .map(|s| (s.id, s.accepts_args()))
            .collect();
        assert_eq!(
            accepts,
            vec![
                ("logrank", false),
                ("survdiff", true),
                ("petopeto_gehanwilcoxon", false),
                ("coxph_lrt", true),
                ("coxph_wald", true),
                ("coxph_score", true),
            ]
        );
        assert_eq!(lookup(TableKind::Survival, "survdiff").unwrap().label, None);
    }

    #[test]
    fn lookup_is_kind_specific() {
        assert!(lookup(TableKind::Summary, "t.test").is_some());
        assert!(lookup(TableKind::Cross, "fisher.test").is_some());
        assert!(lookup(TableKind::Survey, "t.test").is_none());
        assert!(lookup(TableKind::Survival, "wilcox.test").is_none());
    }
}
