//! The G-rho family of k-sample tests for right-censored data.
//!
//! `rho = 0` is the log-rank test and `rho = 1` the Peto & Peto
//! modification of the Gehan-Wilcoxon test.

use crate::dist::chisq_sf;
use crate::error::{Result, StatsError};
use crate::linalg::Matrix;
use crate::TestOutcome;

const TEST: &str = "survdiff";

/// Per-group observed and expected weighted event counts.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvDiff {
    pub observed: Vec<f64>,
    pub expected: Vec<f64>,
    pub variance: Matrix,
    pub outcome: TestOutcome,
}

/// Compare survival across `ngroups` groups. `status` is 1 for an event
/// and 0 for censoring; `groups` holds group codes.
pub fn survdiff(
    time: &[f64],
    status: &[f64],
    groups: &[usize],
    ngroups: usize,
    rho: f64,
) -> Result<SurvDiff> {
    if time.len() != status.len() || time.len() != groups.len() {
        return Err(StatsError::LengthMismatch {
            test: TEST,
            left: time.len(),
            right: status.len().min(groups.len()),
        });
    }
    if rho.is_nan() || rho < 0.0 {
        return Err(StatsError::InvalidArgument {
            test: TEST,
            argument: "rho",
            reason: format!("must be non-negative, got {rho}"),
        });
    }
    if groups.iter().any(|&g| g >= ngroups) {
        return Err(StatsError::InvalidArgument {
            test: TEST,
            argument: "groups",
            reason: format!("group code outside 0..{ngroups}"),
        });
    }
    let present = (0..ngroups).filter(|g| groups.contains(g)).count();
    if present < 2 {
        return Err(StatsError::GroupCount {
            test: TEST,
            expected: "at least 2".to_string(),
            found: present,
        });
    }

    let mut order: Vec<usize> = (0..time.len()).collect();
    order.sort_by(|&a, &b| time[a].total_cmp(&time[b]));

    let mut at_risk = vec![0.0; ngroups];
    for &g in groups {
        at_risk[g] += 1.0;
    }
    let mut observed = vec![0.0; ngroups];
    let mut expected = vec![0.0; ngroups];
    let mut variance = Matrix::zeros(ngroups, ngroups);
    let mut km: f64 = 1.0;

    let mut start = 0;
    while start < order.len() {
        let t = time[order[start]];
        let mut end = start;
        let mut deaths = vec![0.0; ngroups];
        while end < order.len() && time[order[end]] == t {
            let i = order[end];
            if status[i] > 0.0 {
                deaths[groups[i]] += 1.0;
            }
            end += 1;
        }
        let total_deaths: f64 = deaths.iter().sum();
        let total_risk: f64 = at_risk.iter().sum();

        if total_deaths > 0.0 {
            let weight = if rho == 0.0 { 1.0 } else { km.powf(rho) };
            for g in 0..ngroups {
                observed[g] += weight * deaths[g];
                expected[g] += weight * total_deaths * at_risk[g] / total_risk;
            }
            if total_risk > 1.0 {
                let kt = weight * weight * total_deaths * (total_risk - total_deaths)
                    / (total_risk * (total_risk - 1.0));
                for j in 0..ngroups {
                    let share = kt * at_risk[j] / total_risk;
                    variance[(j, j)] += share * (total_risk - at_risk[j]);
                    for k in 0..ngroups {
                        if k != j {
                            variance[(j, k)] -= share * at_risk[k];
                        }
                    }
                }
            }
            km *= (total_risk - total_deaths) / total_risk;
        }

        for &i in &order[start..end] {
            at_risk[groups[i]] -= 1.0;
        }
        start = end;
    }

    // Groups with no expected events carry no information.
    let keep: Vec<usize> = (0..ngroups).filter(|&g| expected[g] > 0.0).collect();
    let df = keep.len().saturating_sub(1);
    let statistic = if df == 0 {
        f64::NAN
    } else {
        let idx = &keep[..df];
        let diff: Vec<f64> = idx.iter().map(|&g| observed[g] - expected[g]).collect();
        let sub = variance.select(idx, idx);
        sub.solve(&diff)
            .map(|solved| diff.iter().zip(&solved).map(|(a, b)| a * b).sum())
            .ok_or(StatsError::Singular { context: TEST })?
    };

    Ok(SurvDiff {
        observed,
        expected,
        variance,
        outcome: TestOutcome {
            statistic: Some(statistic),
            parameter: Some(df as f64),
            p_value: chisq_sf(statistic, df as f64),
            method: None,
            warnings: Vec::new(),
        },
    })
}
