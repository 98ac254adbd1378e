//! Design-based tests for complex survey samples.
//!
//! A [`SurveyDesign`] describes weights, strata and primary sampling units
//! (PSUs). Observations outside the analysed domain carry a weight of zero:
//! they still define the PSU structure for variance estimation but
//! contribute nothing to the estimates.

use std::collections::{BTreeMap, BTreeSet};

use crate::dist::{chisq_sf, f_sf, normal_quantile, t_two_sided};
use crate::error::{Result, StatsError};
use crate::linalg::Matrix;
use crate::TestOutcome;

/// Weights, strata and clusters of a survey sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyDesign {
    weights: Vec<f64>,
    strata: Vec<usize>,
    psu: Vec<usize>,
}

impl SurveyDesign {
    /// Build a design. Without `psu` every observation is its own PSU;
    /// without `strata` the sample is a single stratum.
    pub fn new(
        weights: Vec<f64>,
        strata: Option<Vec<usize>>,
        psu: Option<Vec<usize>>,
    ) -> Result<Self> {
        const TEST: &str = "survey design";
        let n = weights.len();
        if let Some(bad) = weights.iter().find(|w| w.is_nan() || **w < 0.0) {
            return Err(StatsError::InvalidArgument {
                test: TEST,
                argument: "weights",
                reason: format!("weights must be non-negative, found {bad}"),
            });
        }
        let strata = strata.unwrap_or_else(|| vec![0; n]);
        let psu = psu.unwrap_or_else(|| (0..n).collect());
        for other in [strata.len(), psu.len()] {
            if other != n {
                return Err(StatsError::LengthMismatch {
                    test: TEST,
                    left: n,
                    right: other,
                });
            }
        }
        Ok(Self {
            weights,
            strata,
            psu,
        })
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Same design restricted to the observations where `keep` is true.
    pub fn subset(&self, keep: &[bool]) -> Self {
        let weights = self
            .weights
            .iter()
            .zip(keep)
            .map(|(w, k)| if *k { *w } else { 0.0 })
            .collect();
        Self {
            weights,
            strata: self.strata.clone(),
            psu: self.psu.clone(),
        }
    }

    fn in_domain(&self, i: usize) -> bool {
        self.weights[i] > 0.0
    }

    /// Design degrees of freedom: PSUs minus strata, counted over the
    /// observations with positive weight.
    pub fn degrees_of_freedom(&self) -> f64 {
        let mut psus = BTreeSet::new();
        let mut strata = BTreeSet::new();
        for i in (0..self.len()).filter(|&i| self.in_domain(i)) {
            psus.insert((self.strata[i], self.psu[i]));
            strata.insert(self.strata[i]);
        }
        psus.len() as f64 - strata.len() as f64
    }

    /// Variance-covariance matrix of estimated totals.
    ///
    /// `scores[i]` is observation `i`'s weighted contribution to the totals.
    /// Uses the with-replacement approximation between PSUs within strata;
    /// strata with a single PSU contribute nothing.
    pub fn total_vcov(&self, scores: &[Vec<f64>]) -> Matrix {
        let q = scores.first().map_or(0, Vec::len);
        let mut psu_totals: BTreeMap<usize, BTreeMap<usize, Vec<f64>>> = BTreeMap::new();
        for (i, row) in scores.iter().enumerate() {
            let total = psu_totals
                .entry(self.strata[i])
                .or_default()
                .entry(self.psu[i])
                .or_insert_with(|| vec![0.0; q]);
            for (t, v) in total.iter_mut().zip(row) {
                *t += v;
            }
        }

        let mut vcov = Matrix::zeros(q, q);
        for units in psu_totals.values() {
            let nh = units.len() as f64;
            if nh < 2.0 {
                continue;
            }
            let mean: Vec<f64> = (0..q)
                .map(|j| units.values().map(|t| t[j]).sum::<f64>() / nh)
                .collect();
            for total in units.values() {
                let dev: Vec<f64> = total.iter().zip(&mean).map(|(t, m)| t - m).collect();
                vcov.add_outer(&dev, &dev, nh / (nh - 1.0));
            }
        }
        vcov
    }
}

/// Weighted least squares with a design-based sandwich variance.
///
/// Returns the coefficients and their variance-covariance matrix.
pub fn design_regression(
    y: &[f64],
    x: &[Vec<f64>],
    design: &SurveyDesign,
) -> Result<(Vec<f64>, Matrix)> {
    const CONTEXT: &str = "survey regression";
    let p = x.first().map_or(0, Vec::len);
    let mut bread = Matrix::zeros(p, p);
    let mut xty = vec![0.0; p];
    for i in (0..design.len()).filter(|&i| design.in_domain(i)) {
        let w = design.weights[i];
        bread.add_outer(&x[i], &x[i], w);
        for (acc, v) in xty.iter_mut().zip(&x[i]) {
            *acc += w * v * y[i];
        }
    }
    let inverse = bread
        .inverse()
        .ok_or(StatsError::Singular { context: CONTEXT })?;
    let beta = inverse.mul_vec(&xty);

    let scores: Vec<Vec<f64>> = (0..design.len())
        .map(|i| {
            if !design.in_domain(i) {
                return vec![0.0; p];
            }
            let fitted: f64 = x[i].iter().zip(&beta).map(|(a, b)| a * b).sum();
            let resid = y[i] - fitted;
            x[i].iter().map(|v| design.weights[i] * v * resid).collect()
        })
        .collect();
    let meat = design.total_vcov(&scores);
    let vcov = inverse.mul(&meat).mul(&inverse);
    Ok((beta, vcov))
}

/// Group codes present in the domain, in ascending order.
fn domain_levels(groups: &[usize], design: &SurveyDesign) -> Vec<usize> {
    let set: BTreeSet<usize> = (0..design.len())
        .filter(|&i| design.in_domain(i))
        .map(|i| groups[i])
        .collect();
    set.into_iter().collect()
}

fn check_lengths(test: &'static str, a: usize, design: &SurveyDesign) -> Result<()> {
    if a != design.len() {
        return Err(StatsError::LengthMismatch {
            test,
            left: a,
            right: design.len(),
        });
    }
    Ok(())
}

/// Treatment-coded design matrix `1 + factor(groups)`.
fn group_design(groups: &[usize], levels: &[usize]) -> Vec<Vec<f64>> {
    groups
        .iter()
        .map(|g| {
            std::iter::once(1.0)
                .chain(levels[1..].iter().map(|l| if g == l { 1.0 } else { 0.0 }))
                .collect()
        })
        .collect()
}

/// Wald test that the group coefficients of `score ~ factor(groups)` are
/// zero. Two groups give a t statistic on `df - 1` degrees of freedom,
/// more give an F statistic.
fn group_contrast_test(
    test: &'static str,
    score: &[f64],
    groups: &[usize],
    design: &SurveyDesign,
    require_two: bool,
) -> Result<TestOutcome> {
    check_lengths(test, score.len(), design)?;
    check_lengths(test, groups.len(), design)?;
    let levels = domain_levels(groups, design);
    if levels.len() < 2 || (require_two && levels.len() != 2) {
        return Err(StatsError::GroupCount {
            test,
            expected: if require_two { "2" } else { "at least 2" }.to_string(),
            found: levels.len(),
        });
    }
    let x = group_design(groups, &levels);
    let (beta, vcov) = design_regression(score, &x, design)?;
    let degf = design.degrees_of_freedom();

    if levels.len() == 2 {
        let t = beta[1] / vcov[(1, 1)].sqrt();
        let df = degf - 1.0;
        return Ok(TestOutcome {
            statistic: Some(t),
            parameter: Some(df),
            p_value: t_two_sided(t, df),
            method: None,
            warnings: Vec::new(),
        });
    }

    let idx: Vec<usize> = (1..levels.len()).collect();
    let sub = vcov.select(&idx, &idx);
    let coef: Vec<f64> = idx.iter().map(|&j| beta[j]).collect();
    let inverse = sub.inverse().ok_or(StatsError::Singular { context: test })?;
    let ndf = idx.len() as f64;
    let ddf = degf - ndf;
    let f = inverse.quad_form(&coef) / ndf;
    Ok(TestOutcome {
        statistic: Some(f),
        parameter: Some(ndf),
        p_value: f_sf(f, ndf, ddf),
        method: None,
        warnings: Vec::new(),
    })
}

/// Design-based two-sample t-test of `y` between the two groups.
pub fn svy_t_test(y: &[f64], groups: &[usize], design: &SurveyDesign) -> Result<TestOutcome> {
    let mut out = group_contrast_test("svy.t.test", y, groups, design, true)?;
    out.method = Some("Design-based t-test".to_string());
    Ok(out)
}

/// Score applied to weighted mid-ranks in [`svy_rank_test`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankScore {
    Wilcoxon,
    KruskalWallis,
    VanDerWaerden,
    Median,
}

impl RankScore {
    fn apply(self, rank: f64, total: f64) -> f64 {
        match self {
            Self::Wilcoxon | Self::KruskalWallis => rank / total,
            Self::VanDerWaerden => normal_quantile(rank / total),
            Self::Median => {
                if rank > total / 2.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn method(self) -> &'static str {
        match self {
            Self::Wilcoxon | Self::KruskalWallis => "Design-based KruskalWallis test",
            Self::VanDerWaerden => "Design-based vanderWaerden test",
            Self::Median => "Design-based median test",
        }
    }
}

/// Weighted mid-ranks of `y` over the domain: the cumulative weight up to
/// each value minus half its own weight, averaged over ties.
fn weighted_ranks(y: &[f64], design: &SurveyDesign) -> (Vec<f64>, f64) {
    let mut idx: Vec<usize> = (0..y.len()).filter(|&i| design.in_domain(i)).collect();
    idx.sort_by(|&a, &b| y[a].total_cmp(&y[b]));
    let total: f64 = idx.iter().map(|&i| design.weights[i]).sum();

    let mut ranks = vec![0.0; y.len()];
    let mut cumulative = 0.0;
    let mut start = 0;
    while start < idx.len() {
        let mut end = start;
        let mut sum = 0.0;
        while end < idx.len() && y[idx[end]] == y[idx[start]] {
            let w = design.weights[idx[end]];
            cumulative += w;
            sum += cumulative - w / 2.0;
            end += 1;
        }
        let mean = sum / (end - start) as f64;
        for &i in &idx[start..end] {
            ranks[i] = mean;
        }
        start = end;
    }
    (ranks, total)
}

/// Design-based rank test of `y` across groups.
pub fn svy_rank_test(
    y: &[f64],
    groups: &[usize],
    design: &SurveyDesign,
    score: RankScore,
) -> Result<TestOutcome> {
    let test = match score {
        RankScore::Wilcoxon => "svy.wilcox.test",
        RankScore::KruskalWallis => "svy.kruskal.test",
        RankScore::VanDerWaerden => "svy.vanderwaerden.test",
        RankScore::Median => "svy.median.test",
    };
    check_lengths(test, y.len(), design)?;
    let (ranks, total) = weighted_ranks(y, design);
    let scores: Vec<f64> = ranks.iter().map(|r| score.apply(*r, total)).collect();
    let mut out = group_contrast_test(test, &scores, groups, design, false)?;
    out.method = Some(score.method().to_string());
    Ok(out)
}

/// Statistic reported by [`svy_chisq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChisqStatistic {
    /// Rao-Scott second-order correction, referred to an F distribution.
    SecondOrder,
    /// Pearson statistic divided by the mean design effect.
    FirstOrder,
    Wald,
    AdjustedWald,
}

/// Design-based test of independence between two categorical variables.
pub fn svy_chisq(
    rows: &[usize],
    cols: &[usize],
    design: &SurveyDesign,
    statistic: ChisqStatistic,
) -> Result<TestOutcome> {
    const TEST: &str = "svychisq";
    check_lengths(TEST, rows.len(), design)?;
    check_lengths(TEST, cols.len(), design)?;
    let row_levels = domain_levels(rows, design);
    let col_levels = domain_levels(cols, design);
    let (nr, nc) = (row_levels.len(), col_levels.len());
    if nr < 2 || nc < 2 {
        return Err(StatsError::GroupCount {
            test: TEST,
            expected: "at least 2 rows and columns, got".to_string(),
            found: nr.min(nc),
        });
    }
    let position = |levels: &[usize], v: usize| levels.iter().position(|l| *l == v);
    let ncell = nr * nc;

    // Cells enumerate rows fastest.
    let cell_of: Vec<Option<usize>> = (0..design.len())
        .map(|i| {
            if !design.in_domain(i) {
                return None;
            }
            let r = position(&row_levels, rows[i])?;
            let c = position(&col_levels, cols[i])?;
            Some(r + nr * c)
        })
        .collect();

    let wsum: f64 = (0..design.len())
        .filter(|&i| design.in_domain(i))
        .map(|i| design.weights[i])
        .sum();
    let mut prop = vec![0.0; ncell];
    for (i, cell) in cell_of.iter().enumerate() {
        if let Some(k) = cell {
            prop[*k] += design.weights[i] / wsum;
        }
    }
    let scores: Vec<Vec<f64>> = cell_of
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Some(k) => (0..ncell)
                .map(|j| {
                    let indicator = if j == *k { 1.0 } else { 0.0 };
                    design.weights[i] * (indicator - prop[j]) / wsum
                })
                .collect(),
            None => vec![0.0; ncell],
        })
        .collect();
    let v_design = design.total_vcov(&scores);
    let degf = design.degrees_of_freedom();
    let df = ((nr - 1) * (nc - 1)) as f64;

    let row_marg: Vec<f64> = (0..nr)
        .map(|r| (0..nc).map(|c| prop[r + nr * c]).sum())
        .collect();
    let col_marg: Vec<f64> = (0..nc)
        .map(|c| (0..nr).map(|r| prop[r + nr * c]).sum())
        .collect();

    match statistic {
        ChisqStatistic::Wald | ChisqStatistic::AdjustedWald => {
            let mut contrast = Vec::new();
            let mut jacobian = Vec::new();
            for r in 0..nr - 1 {
                for c in 0..nc - 1 {
                    contrast.push(prop[r + nr * c] - row_marg[r] * col_marg[c]);
                    let grad: Vec<f64> = (0..ncell)
                        .map(|k| {
                            let (kr, kc) = (k % nr, k / nr);
                            let mut g = if kr == r && kc == c { 1.0 } else { 0.0 };
                            if kr == r {
                                g -= col_marg[c];
                            }
                            if kc == c {
                                g -= row_marg[r];
                            }
                            g
                        })
                        .collect();
                    jacobian.push(grad);
                }
            }
            let g = Matrix::from_rows(&jacobian);
            let v = g.mul(&v_design).mul(&g.transpose());
            let inverse = v.inverse().ok_or(StatsError::Singular { context: TEST })?;
            let wald = inverse.quad_form(&contrast);
            let (f, ddf) = if statistic == ChisqStatistic::Wald {
                (wald / df, degf)
            } else {
                (wald * (degf - df + 1.0) / (df * degf), degf - df + 1.0)
            };
            Ok(TestOutcome {
                statistic: Some(f),
                parameter: Some(df),
                p_value: f_sf(f, df, ddf),
                method: Some("Design-based Wald test of association".to_string()),
                warnings: Vec::new(),
            })
        }
        ChisqStatistic::SecondOrder | ChisqStatistic::FirstOrder => {
            let pearson: f64 = (0..ncell)
                .map(|k| {
                    let expected = wsum * row_marg[k % nr] * col_marg[k / nr];
                    let observed = wsum * prop[k];
                    if expected > 0.0 {
                        (observed - expected).powi(2) / expected
                    } else {
                        0.0
                    }
                })
                .sum();
            let delta = design_effect_matrix(&prop, &v_design, nr, nc, wsum)?;
            let trace = delta.trace();
            if statistic == ChisqStatistic::FirstOrder {
                let x2 = pearson / (trace / df);
                return Ok(TestOutcome {
                    statistic: Some(x2),
                    parameter: Some(df),
                    p_value: chisq_sf(x2, df),
                    method: Some("Pearson's X^2: Rao & Scott adjustment".to_string()),
                    warnings: Vec::new(),
                });
            }
            let d0 = trace * trace / delta.mul(&delta).trace();
            let f = pearson / trace;
            Ok(TestOutcome {
                statistic: Some(f),
                parameter: Some(d0),
                p_value: f_sf(f, d0, d0 * degf),
                method: Some("Pearson's X^2: Rao & Scott adjustment".to_string()),
                warnings: Vec::new(),
            })
        }
    }
}

/// Generalised design effect matrix of the interaction contrasts.
fn design_effect_matrix(
    prop: &[f64],
    v_design: &Matrix,
    nr: usize,
    nc: usize,
    total: f64,
) -> Result<Matrix> {
    let ncell = nr * nc;
    // Main-effects design over cells, and interaction columns.
    let main: Vec<Vec<f64>> = (0..ncell)
        .map(|k| {
            let (r, c) = (k % nr, k / nr);
            std::iter::once(1.0)
                .chain((1..nr).map(|l| if r == l { 1.0 } else { 0.0 }))
                .chain((1..nc).map(|l| if c == l { 1.0 } else { 0.0 }))
                .collect()
        })
        .collect();
    let interaction: Vec<Vec<f64>> = (0..ncell)
        .map(|k| {
            let (r, c) = (k % nr, k / nr);
            let mut row = Vec::with_capacity((nr - 1) * (nc - 1));
            for lc in 1..nc {
                for lr in 1..nr {
                    row.push(if r == lr && c == lc { 1.0 } else { 0.0 });
                }
            }
            row
        })
        .collect();
    let x1 = Matrix::from_rows(&main);
    let x12 = Matrix::from_rows(&interaction);
    let x1t = x1.transpose();
    let projection = x1
        .mul(
            &x1t.mul(&x1)
                .inverse()
                .ok_or(StatsError::Singular { context: "svychisq" })?,
        )
        .mul(&x1t);
    let mut residual_maker = Matrix::identity(ncell);
    for i in 0..ncell {
        for j in 0..ncell {
            residual_maker[(i, j)] -= projection[(i, j)];
        }
    }
    let contrasts = residual_maker.mul(&x12);

    let mut inv_diag = Matrix::zeros(ncell, ncell);
    let mut v_srs = Matrix::zeros(ncell, ncell);
    for i in 0..ncell {
        inv_diag[(i, i)] = if prop[i] > 0.0 { 1.0 / (prop[i] * total) } else { 0.0 };
        for j in 0..ncell {
            let diag = if i == j { prop[i] } else { 0.0 };
            v_srs[(i, j)] = (diag - prop[i] * prop[j]) / total;
        }
    }
    let left = contrasts.transpose().mul(&inv_diag);
    let right = inv_diag.mul(&contrasts);
    let denom = left.mul(&v_srs).mul(&right);
    let numer = left.mul(v_design).mul(&right);
    let inverse = denom
        .inverse()
        .ok_or(StatsError::Singular { context: "svychisq" })?;
    Ok(inverse.mul(&numer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srs(n: usize) -> SurveyDesign {
        SurveyDesign::new(vec![1.0; n], None, None).unwrap()
    }

    #[test]
    fn test_degrees_of_freedom() {
        let design = SurveyDesign::new(
            vec![1.0; 6],
            Some(vec![0, 0, 0, 1, 1, 1]),
            Some(vec![0, 0, 1, 2, 3, 3]),
        )
        .unwrap();
        assert_eq!(design.degrees_of_freedom(), 2.0);
        let subset = design.subset(&[true, true, true, false, false, false]);
        assert_eq!(subset.degrees_of_freedom(), 1.0);
    }

    #[test]
    fn test_rejects_negative_weights() {
        assert!(SurveyDesign::new(vec![1.0, -1.0], None, None).is_err());
    }

    #[test]
    fn test_regression_recovers_group_means() {
        let y = [1.0, 2.0, 3.0, 7.0, 8.0, 9.0];
        let x: Vec<Vec<f64>> = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]
            .iter()
            .map(|g| vec![1.0, *g])
            .collect();
        let (beta, vcov) = design_regression(&y, &x, &srs(6)).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-12);
        assert!((beta[1] - 6.0).abs() < 1e-12);
        assert!(vcov[(1, 1)] > 0.0);
    }

    #[test]
    fn test_t_test_df_is_design_df_minus_one() {
        let y = [1.0, 2.0, 3.0, 4.0, 7.0, 8.0, 9.0, 11.0];
        let g = [0, 0, 0, 0, 1, 1, 1, 1];
        let out = svy_t_test(&y, &g, &srs(8)).unwrap();
        assert_eq!(out.parameter, Some(6.0));
        assert!(out.p_value < 0.01);
    }

    #[test]
    fn test_zero_weight_rows_are_ignored() {
        let y = [1.0, 2.0, 3.0, 4.0, 7.0, 8.0, 9.0, 11.0, f64::NAN];
        let g = [0, 0, 0, 0, 1, 1, 1, 1, 0];
        let mut w = vec![1.0; 9];
        w[8] = 0.0;
        let design = SurveyDesign::new(w, None, None).unwrap();
        let out = svy_t_test(&y, &g, &design).unwrap();
        assert!(out.p_value.is_finite());
        assert_eq!(out.parameter, Some(6.0));
    }

    #[test]
    fn test_weighted_ranks_with_ties() {
        let (ranks, total) = weighted_ranks(&[3.0, 1.0, 3.0], &srs(3));
        assert_eq!(total, 3.0);
        // cumulative 1 -> 0.5 ; tied pair -> (1.5 + 2.5) / 2
        assert_eq!(ranks, vec![2.0, 0.5, 2.0]);
    }

    #[test]
    fn test_rank_test_three_groups_uses_f() {
        let y: Vec<f64> = (0..12).map(f64::from).collect();
        let g = [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];
        let out = svy_rank_test(&y, &g, &srs(12), RankScore::KruskalWallis).unwrap();
        assert_eq!(out.parameter, Some(2.0));
        assert!(out.p_value < 0.05);
    }

    #[test]
    fn test_chisq_under_srs_is_close_to_pearson() {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for (r, c, n) in [(0, 0, 30), (0, 1, 20), (1, 0, 15), (1, 1, 35)] {
            for _ in 0..n {
                rows.push(r);
                cols.push(c);
            }
        }
        let design = srs(rows.len());
        let first = svy_chisq(&rows, &cols, &design, ChisqStatistic::FirstOrder).unwrap();
        let table = crate::contingency::ContingencyTable::tabulate(&rows, &cols, 2, 2).unwrap();
        let pearson = crate::contingency::chisq_test(&table, false).unwrap();
        let ratio = first.statistic.unwrap() / pearson.statistic.unwrap();
        assert!((ratio - 1.0).abs() < 0.05, "ratio {ratio}");

        for stat in [
            ChisqStatistic::SecondOrder,
            ChisqStatistic::Wald,
            ChisqStatistic::AdjustedWald,
        ] {
            let out = svy_chisq(&rows, &cols, &design, stat).unwrap();
            assert!(out.p_value < 0.01, "{stat:?}: {}", out.p_value);
        }
    }
}
