//! Paired-sample tests. Observations are matched by position.

use crate::continuous::{exact_two_sided, EXACT_LIMIT};
use crate::dist::{chisq_sf, normal_cdf, t_two_sided};
use crate::error::{Result, StatsError};
use crate::rank::{average_ranks, has_ties, tie_sum};
use crate::TestOutcome;

fn differences(test: &'static str, x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch {
            test,
            left: x.len(),
            right: y.len(),
        });
    }
    Ok(x.iter().zip(y).map(|(a, b)| a - b).collect())
}

/// Paired t-test on `x - y`.
pub fn paired_t_test(x: &[f64], y: &[f64]) -> Result<TestOutcome> {
    const TEST: &str = "paired.t.test";
    let d = differences(TEST, x, y)?;
    if d.len() < 2 {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: format!("{} pairs", d.len()),
        });
    }
    let n = d.len() as f64;
    let m = d.iter().sum::<f64>() / n;
    let var = d.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0);
    let stderr = (var / n).sqrt();
    if stderr.is_nan() || stderr <= 10.0 * f64::EPSILON * m.abs() {
        return Err(StatsError::ConstantData { test: TEST });
    }
    let t = m / stderr;
    let df = n - 1.0;
    Ok(TestOutcome {
        statistic: Some(t),
        parameter: Some(df),
        p_value: t_two_sided(t, df),
        method: Some("Paired t-test".to_string()),
        warnings: Vec::new(),
    })
}

/// Number of subsets of `{1..n}` with each possible sum.
fn signed_rank_counts(n: usize) -> Vec<f64> {
    let max = n * (n + 1) / 2;
    let mut counts = vec![0.0; max + 1];
    counts[0] = 1.0;
    for k in 1..=n {
        for s in (k..=max).rev() {
            counts[s] += counts[s - k];
        }
    }
    counts
}

/// Wilcoxon signed rank test on `x - y`.
///
/// Zero differences are dropped. The exact null distribution is used for
/// fewer than 50 pairs when there are no ties or zeros.
pub fn wilcoxon_signed_rank(
    x: &[f64],
    y: &[f64],
    correct: bool,
    exact: Option<bool>,
) -> Result<TestOutcome> {
    const TEST: &str = "paired.wilcox.test";
    let all = differences(TEST, x, y)?;
    let had_zeros = all.iter().any(|d| *d == 0.0);
    let d: Vec<f64> = all.into_iter().filter(|d| *d != 0.0).collect();
    if d.is_empty() {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: "no non-zero differences".to_string(),
        });
    }
    let n = d.len();
    let abs: Vec<f64> = d.iter().map(|v| v.abs()).collect();
    let (ranks, ties) = average_ranks(&abs);
    let v: f64 = ranks
        .iter()
        .zip(&d)
        .filter(|(_, diff)| **diff > 0.0)
        .map(|(r, _)| *r)
        .sum();
    let nf = n as f64;
    let centre = nf * (nf + 1.0) / 4.0;

    let mut warnings = Vec::new();
    let use_exact = exact.unwrap_or(n < EXACT_LIMIT);
    if use_exact && exact == Some(true) && (has_ties(&ties) || had_zeros) {
        warnings.push("cannot compute exact p-value with ties or zeroes".to_string());
    }

    let p_value = if use_exact && !has_ties(&ties) && !had_zeros {
        exact_two_sided(&signed_rank_counts(n), v, centre)
    } else {
        let sigma = (nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_sum(&ties) / 48.0).sqrt();
        let z = v - centre;
        let correction = if correct { 0.5 * z.signum() } else { 0.0 };
        if sigma > 0.0 {
            let z = (z - correction) / sigma;
            2.0 * normal_cdf(z).min(1.0 - normal_cdf(z))
        } else {
            f64::NAN
        }
    };

    Ok(TestOutcome {
        statistic: Some(v),
        parameter: None,
        p_value: p_value.min(1.0),
        method: Some("Wilcoxon signed rank test".to_string()),
        warnings,
    })
}

/// McNemar's test of symmetry on a square table of paired counts.
///
/// The continuity correction only applies to 2x2 tables.
pub fn mcnemar_test(table: &[Vec<f64>], correct: bool) -> Result<TestOutcome> {
    const TEST: &str = "mcnemar.test";
    let r = table.len();
    if r < 2 {
        return Err(StatsError::GroupCount {
            test: TEST,
            expected: "at least 2".to_string(),
            found: r,
        });
    }
    if let Some(row) = table.iter().find(|row| row.len() != r) {
        return Err(StatsError::LengthMismatch {
            test: TEST,
            left: r,
            right: row.len(),
        });
    }

    let corrected = correct && r == 2 && table[0][1] != table[1][0];
    let mut statistic = 0.0;
    for i in 0..r {
        for j in (i + 1)..r {
            let (a, b) = (table[i][j], table[j][i]);
            let num = if corrected {
                ((a - b).abs() - 1.0).powi(2)
            } else {
                (a - b).powi(2)
            };
            statistic += num / (a + b);
        }
    }
    let df = (r * (r - 1) / 2) as f64;
    Ok(TestOutcome {
        statistic: Some(statistic),
        parameter: Some(df),
        p_value: chisq_sf(statistic, df),
        method: Some(if corrected {
            "McNemar's Chi-squared test with continuity correction".to_string()
        } else {
            "McNemar's Chi-squared test".to_string()
        }),
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_rank_counts() {
        // n = 3: sums 0..6 -> 1,1,1,2,1,1,1
        assert_eq!(
            signed_rank_counts(3),
            vec![1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0]
        );
    }

    #[test]
    fn test_signed_rank_all_positive() {
        // V = 15 for five positive differences: p = 2/32
        let x = [2.0, 4.0, 6.0, 8.0, 10.0];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = wilcoxon_signed_rank(&x, &y, true, None).unwrap();
        assert_eq!(out.statistic, Some(15.0));
        assert!((out.p_value - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_paired_t_length_mismatch() {
        let err = paired_t_test(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, StatsError::LengthMismatch { .. }));
    }

    #[test]
    fn test_paired_t_constant_shift() {
        let err = paired_t_test(&[2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, StatsError::ConstantData { test: "paired.t.test" });
    }

    #[test]
    fn test_mcnemar_two_by_two() {
        // b = 10, c = 5: (|10-5|-1)^2 / 15 = 16/15
        let out = mcnemar_test(&[vec![20.0, 10.0], vec![5.0, 30.0]], true).unwrap();
        assert!((out.statistic.unwrap() - 16.0 / 15.0).abs() < 1e-12);
        assert_eq!(out.parameter, Some(1.0));
    }
}
