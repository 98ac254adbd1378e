//! Tests comparing a continuous measurement across groups.

use crate::dist::{chisq_sf, f_sf, normal_cdf, t_two_sided};
use crate::error::{Result, StatsError};
use crate::rank::{average_ranks, has_ties, tie_sum};
use crate::TestOutcome;

/// Sample sizes below which the Wilcoxon tests use their exact null
/// distribution when there are no ties.
pub const EXACT_LIMIT: usize = 50;

fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

fn variance(x: &[f64]) -> f64 {
    let m = mean(x);
    x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (x.len() as f64 - 1.0)
}

/// Two-sample t-test of `x` against `y`.
///
/// Uses the Welch-Satterthwaite degrees of freedom unless `var_equal`.
pub fn t_test(x: &[f64], y: &[f64], var_equal: bool) -> Result<TestOutcome> {
    const TEST: &str = "t.test";
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    if var_equal {
        if x.is_empty() || y.is_empty() || x.len() + y.len() < 3 {
            return Err(StatsError::InsufficientData {
                test: TEST,
                detail: format!("{} and {} observations", x.len(), y.len()),
            });
        }
    } else if x.len() < 2 || y.len() < 2 {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: format!("{} and {} observations", x.len(), y.len()),
        });
    }

    let (mx, my) = (mean(x), mean(y));
    let vx = if x.len() > 1 { variance(x) } else { 0.0 };
    let vy = if y.len() > 1 { variance(y) } else { 0.0 };

    let (stderr, df) = if var_equal {
        let df = nx + ny - 2.0;
        let pooled = ((nx - 1.0) * vx + (ny - 1.0) * vy) / df;
        ((pooled * (1.0 / nx + 1.0 / ny)).sqrt(), df)
    } else {
        let sx = vx / nx;
        let sy = vy / ny;
        let stderr = (sx + sy).sqrt();
        let df = (sx + sy).powi(2) / (sx.powi(2) / (nx - 1.0) + sy.powi(2) / (ny - 1.0));
        (stderr, df)
    };

    if stderr.is_nan() || stderr <= 10.0 * f64::EPSILON * mx.abs().max(my.abs()) {
        return Err(StatsError::ConstantData { test: TEST });
    }

    let t = (mx - my) / stderr;
    Ok(TestOutcome {
        statistic: Some(t),
        parameter: Some(df),
        p_value: t_two_sided(t, df),
        method: Some(if var_equal {
            "Two Sample t-test".to_string()
        } else {
            "Welch Two Sample t-test".to_string()
        }),
        warnings: Vec::new(),
    })
}

/// One-way analysis of variance across `groups`.
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "aov";
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    if groups.len() < 2 {
        return Err(StatsError::GroupCount {
            test: TEST,
            expected: "at least 2".to_string(),
            found: groups.len(),
        });
    }
    let n: usize = groups.iter().map(|g| g.len()).sum();
    let k = groups.len();
    if n <= k {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: format!("{n} observations in {k} groups"),
        });
    }

    let grand = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let mut ssb = 0.0;
    let mut ssw = 0.0;
    for g in &groups {
        let m = mean(g);
        ssb += g.len() as f64 * (m - grand).powi(2);
        ssw += g.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    }
    let df1 = (k - 1) as f64;
    let df2 = (n - k) as f64;
    let msb = ssb / df1;
    let msw = ssw / df2;
    let f = if msw > 0.0 {
        msb / msw
    } else if msb > 0.0 {
        f64::INFINITY
    } else {
        f64::NAN
    };

    Ok(TestOutcome {
        statistic: Some(f),
        parameter: Some(df1),
        p_value: f_sf(f, df1, df2),
        method: None,
        warnings: Vec::new(),
    })
}

/// Number of arrangements giving each value of the Mann-Whitney U statistic
/// for sample sizes `m` and `n` (coefficients of the Gaussian binomial).
pub(crate) fn rank_sum_counts(m: usize, n: usize) -> Vec<f64> {
    let mut prev: Vec<Vec<f64>> = vec![vec![1.0]];
    for big_n in 1..=(m + n) {
        let kmax = big_n.min(m);
        let mut cur: Vec<Vec<f64>> = Vec::with_capacity(kmax + 1);
        for k in 0..=kmax {
            let mut poly = vec![0.0; k * (big_n - k) + 1];
            if k >= 1 {
                if let Some(a) = prev.get(k - 1) {
                    for (i, c) in a.iter().enumerate() {
                        poly[i] += c;
                    }
                }
            }
            if k < big_n {
                if let Some(b) = prev.get(k) {
                    for (i, c) in b.iter().enumerate() {
                        poly[i + k] += c;
                    }
                }
            }
            cur.push(poly);
        }
        prev = cur;
    }
    prev.swap_remove(m)
}

/// `P(U <= q)` from arrangement counts.
fn lower_tail(counts: &[f64], q: f64) -> f64 {
    if q < 0.0 {
        return 0.0;
    }
    let total: f64 = counts.iter().sum();
    let upto = (q.floor() as usize).min(counts.len() - 1);
    counts[..=upto].iter().sum::<f64>() / total
}

/// Two-sided exact p-value from an arrangement-count distribution whose
/// centre is `centre`.
pub(crate) fn exact_two_sided(counts: &[f64], statistic: f64, centre: f64) -> f64 {
    let p = if statistic > centre {
        1.0 - lower_tail(counts, statistic - 1.0)
    } else {
        lower_tail(counts, statistic)
    };
    (2.0 * p).min(1.0)
}

/// Wilcoxon rank sum (Mann-Whitney) test of `x` against `y`.
///
/// The statistic is `W = sum(rank(x)) - nx(nx+1)/2`. The exact null
/// distribution is used for small samples without ties unless `exact`
/// says otherwise; the normal approximation applies a continuity
/// correction when `correct`.
pub fn wilcoxon_rank_sum(
    x: &[f64],
    y: &[f64],
    correct: bool,
    exact: Option<bool>,
) -> Result<TestOutcome> {
    const TEST: &str = "wilcox.test";
    if x.is_empty() || y.is_empty() {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: format!("{} and {} observations", x.len(), y.len()),
        });
    }
    let (nx, ny) = (x.len(), y.len());
    let combined: Vec<f64> = x.iter().chain(y).copied().collect();
    let (ranks, ties) = average_ranks(&combined);
    let w = ranks[..nx].iter().sum::<f64>() - (nx * (nx + 1)) as f64 / 2.0;
    let centre = (nx * ny) as f64 / 2.0;

    let use_exact = exact.unwrap_or(nx < EXACT_LIMIT && ny < EXACT_LIMIT);
    let mut warnings = Vec::new();
    if use_exact && has_ties(&ties) && exact == Some(true) {
        warnings.push("cannot compute exact p-value with ties".to_string());
    }

    let p_value = if use_exact && !has_ties(&ties) {
        exact_two_sided(&rank_sum_counts(nx, ny), w, centre)
    } else {
        let n = (nx + ny) as f64;
        let sigma = ((nx * ny) as f64 / 12.0 * ((n + 1.0) - tie_sum(&ties) / (n * (n - 1.0))))
            .sqrt();
        let z = w - centre;
        let correction = if correct { 0.5 * z.signum() } else { 0.0 };
        let z = (z - correction) / sigma;
        if sigma > 0.0 {
            2.0 * normal_cdf(z).min(1.0 - normal_cdf(z))
        } else {
            f64::NAN
        }
    };

    Ok(TestOutcome {
        statistic: Some(w),
        parameter: None,
        p_value: p_value.min(1.0),
        method: None,
        warnings,
    })
}

/// Kruskal-Wallis rank sum test across `groups`.
pub fn kruskal_wallis(groups: &[Vec<f64>]) -> Result<TestOutcome> {
    const TEST: &str = "kruskal.test";
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    if groups.len() < 2 {
        return Err(StatsError::GroupCount {
            test: TEST,
            expected: "at least 2".to_string(),
            found: groups.len(),
        });
    }
    let combined: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = combined.len() as f64;
    let (ranks, ties) = average_ranks(&combined);

    let mut offset = 0;
    let mut sum = 0.0;
    for g in &groups {
        let r: f64 = ranks[offset..offset + g.len()].iter().sum();
        sum += r * r / g.len() as f64;
        offset += g.len();
    }
    let h = 12.0 / (n * (n + 1.0)) * sum - 3.0 * (n + 1.0);
    let denom = 1.0 - tie_sum(&ties) / (n * n * n - n);
    let h = if denom > 0.0 { h / denom } else { f64::NAN };
    let df = (groups.len() - 1) as f64;

    Ok(TestOutcome {
        statistic: Some(h),
        parameter: Some(df),
        p_value: chisq_sf(h, df),
        method: None,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_sum_counts_small() {
        // U for m = 2, n = 2: 0,1,2,2,3,4 -> counts 1,1,2,1,1
        assert_eq!(rank_sum_counts(2, 2), vec![1.0, 1.0, 2.0, 1.0, 1.0]);
        let total: f64 = rank_sum_counts(5, 7).iter().sum();
        assert_eq!(total, 792.0); // choose(12, 5)
    }

    #[test]
    fn test_wilcoxon_exact_complete_separation() {
        // wilcox.test(1:3, 4:6): W = 0, p = 2/20 = 0.1
        let out = wilcoxon_rank_sum(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], true, None).unwrap();
        assert_eq!(out.statistic, Some(0.0));
        assert!((out.p_value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_wilcoxon_normal_with_ties() {
        let out = wilcoxon_rank_sum(&[1.0, 2.0, 2.0, 3.0], &[2.0, 4.0, 5.0, 6.0], true, None)
            .unwrap();
        assert!(out.p_value > 0.0 && out.p_value < 1.0);
    }

    #[test]
    fn test_t_test_welch_symmetry() {
        let a = [5.1, 4.9, 5.6, 5.8, 6.0];
        let b = [6.5, 6.9, 7.1, 6.4, 7.3, 7.0];
        let ab = t_test(&a, &b, false).unwrap();
        let ba = t_test(&b, &a, false).unwrap();
        assert!((ab.p_value - ba.p_value).abs() < 1e-12);
        assert!(ab.statistic.unwrap() < 0.0);
        assert!(ab.p_value < 0.01);
        assert_eq!(ab.method.as_deref(), Some("Welch Two Sample t-test"));
    }

    #[test]
    fn test_t_test_pooled_matches_hand_computation() {
        // means 2 and 5, both variances 1, n = 3: t = -3 / sqrt(2/3), df = 4
        let out = t_test(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], true).unwrap();
        let t = -3.0 / (2.0_f64 / 3.0).sqrt();
        assert!((out.statistic.unwrap() - t).abs() < 1e-12);
        assert_eq!(out.parameter, Some(4.0));
    }

    #[test]
    fn test_t_test_constant_data() {
        let err = t_test(&[1.0, 1.0], &[1.0, 1.0], false).unwrap_err();
        assert_eq!(err, StatsError::ConstantData { test: "t.test" });
    }

    #[test]
    fn test_anova_equal_means() {
        let out = one_way_anova(&[vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(out.statistic, Some(0.0));
        assert_eq!(out.p_value, 1.0);
    }

    #[test]
    fn test_kruskal_without_ties() {
        // ranks: g1 = 1,2,3 ; g2 = 4,5,6 -> H = 12/42*(36/3+225/3) - 21 = 3.857143
        let out = kruskal_wallis(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert!((out.statistic.unwrap() - 27.0 / 7.0).abs() < 1e-9);
        assert_eq!(out.parameter, Some(1.0));
    }

    #[test]
    fn test_kruskal_requires_two_groups() {
        assert!(kruskal_wallis(&[vec![1.0, 2.0]]).is_err());
    }
}
