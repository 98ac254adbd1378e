//! Random-intercept logistic regression fitted by the Laplace approximation.
//!
//! Used to test a covariate's association with a binary outcome when
//! observations are clustered: the model `y ~ covariates + (1 | cluster)` is
//! compared with `y ~ 1 + (1 | cluster)` by a likelihood ratio test.

use tracing::debug;

use crate::dist::chisq_sf;
use crate::error::{Result, StatsError};
use crate::linalg::Matrix;
use crate::optim::{nelder_mead, SimplexOptions};
use crate::TestOutcome;

const TEST: &str = "lme4";
const MIN_LOG_SIGMA: f64 = -12.0;

/// Fitted model summary.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedFit {
    /// Fixed effects, intercept first.
    pub beta: Vec<f64>,
    /// Standard deviation of the random intercept.
    pub sigma: f64,
    /// Laplace-approximated log-likelihood.
    pub log_likelihood: f64,
    pub converged: bool,
}

fn log1p_exp(eta: f64) -> f64 {
    if eta > 35.0 {
        eta
    } else if eta < -35.0 {
        eta.exp()
    } else {
        eta.exp().ln_1p()
    }
}

fn logistic(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

struct Clustered<'a> {
    y: &'a [f64],
    design: &'a [Vec<f64>],
    members: Vec<Vec<usize>>,
}

impl Clustered<'_> {
    fn linear(&self, beta: &[f64], i: usize) -> f64 {
        self.design[i].iter().zip(beta).map(|(x, b)| x * b).sum()
    }

    /// Laplace log-likelihood at `(beta, log sigma)`.
    fn log_likelihood(&self, beta: &[f64], log_sigma: f64) -> f64 {
        let sigma2 = (2.0 * log_sigma.max(MIN_LOG_SIGMA)).exp();
        let mut total = 0.0;
        for rows in &self.members {
            let offsets: Vec<f64> = rows.iter().map(|&i| self.linear(beta, i)).collect();
            let mut b = 0.0;
            let mut hess = 0.0;
            for _ in 0..50 {
                let mut grad = -b / sigma2;
                hess = -1.0 / sigma2;
                for (k, &i) in rows.iter().enumerate() {
                    let p = logistic(offsets[k] + b);
                    grad += self.y[i] - p;
                    hess -= p * (1.0 - p);
                }
                let step = grad / hess;
                b -= step;
                if step.abs() < 1e-10 {
                    break;
                }
            }
            let mut ll = -b * b / (2.0 * sigma2) - 0.5 * sigma2.ln() - 0.5 * (-hess).ln();
            for (k, &i) in rows.iter().enumerate() {
                let eta = offsets[k] + b;
                ll += self.y[i] * eta - log1p_exp(eta);
            }
            total += ll;
        }
        total
    }
}

/// Ordinary logistic regression by iteratively reweighted least squares.
/// Falls back to zeros when the information matrix is singular.
fn logistic_start(y: &[f64], design: &[Vec<f64>]) -> Vec<f64> {
    let p = design.first().map_or(0, Vec::len);
    let mut beta = vec![0.0; p];
    for _ in 0..25 {
        let mut info = Matrix::zeros(p, p);
        let mut score = vec![0.0; p];
        for (row, &yi) in design.iter().zip(y) {
            let eta: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            let mu = logistic(eta);
            info.add_outer(row, row, mu * (1.0 - mu));
            for (s, x) in score.iter_mut().zip(row) {
                *s += x * (yi - mu);
            }
        }
        let Some(step) = info.solve(&score) else {
            return vec![0.0; p];
        };
        let mut largest: f64 = 0.0;
        for (b, s) in beta.iter_mut().zip(&step) {
            *b += s;
            largest = largest.max(s.abs());
        }
        if largest < 1e-8 {
            break;
        }
    }
    beta.iter().map(|b| b.clamp(-15.0, 15.0)).collect()
}

/// Fit `y ~ design + (1 | cluster)`. `design` rows must include the
/// intercept column.
pub fn fit_random_intercept(
    y: &[f64],
    design: &[Vec<f64>],
    clusters: &[usize],
) -> Result<MixedFit> {
    if y.len() != design.len() || y.len() != clusters.len() {
        return Err(StatsError::LengthMismatch {
            test: TEST,
            left: y.len(),
            right: design.len().min(clusters.len()),
        });
    }
    if let Some(bad) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(StatsError::InvalidArgument {
            test: TEST,
            argument: "outcome",
            reason: format!("must be coded 0/1, found {bad}"),
        });
    }
    let ncluster = clusters.iter().max().map_or(0, |m| m + 1);
    let mut members = vec![Vec::new(); ncluster];
    for (i, &c) in clusters.iter().enumerate() {
        members[c].push(i);
    }
    members.retain(|m| !m.is_empty());
    if members.len() < 2 {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: format!("{} clusters", members.len()),
        });
    }

    let data = Clustered { y, design, members };
    let p = design.first().map_or(0, Vec::len);
    let mut start = logistic_start(y, design);
    start.push(0.5_f64.ln());

    let objective = |theta: &[f64]| -data.log_likelihood(&theta[..p], theta[p]);
    let options = SimplexOptions {
        step: 0.3,
        tolerance: 1e-12,
        max_iterations: 4_000 * (p + 1),
    };
    let mut min = nelder_mead(objective, &start, options);
    // A restart from the first optimum guards against simplex collapse.
    let restart = nelder_mead(objective, &min.point, options);
    if restart.value <= min.value {
        min = restart;
    }
    debug!(
        iterations = min.iterations,
        converged = min.converged,
        "random intercept model fitted"
    );

    Ok(MixedFit {
        beta: min.point[..p].to_vec(),
        sigma: min.point[p].max(MIN_LOG_SIGMA).exp(),
        log_likelihood: -min.value,
        converged: min.converged,
    })
}

/// Likelihood ratio test of `covariates` in a random-intercept logistic
/// model for the binary `y` clustered by `clusters`.
///
/// `covariates` holds one row per observation, without the intercept.
pub fn random_intercept_lrt(
    y: &[f64],
    covariates: &[Vec<f64>],
    clusters: &[usize],
) -> Result<TestOutcome> {
    let extra = covariates.first().map_or(0, Vec::len);
    if extra == 0 {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: "no covariate columns".to_string(),
        });
    }
    let full_design: Vec<Vec<f64>> = covariates
        .iter()
        .map(|row| std::iter::once(1.0).chain(row.iter().copied()).collect())
        .collect();
    let null_design: Vec<Vec<f64>> = vec![vec![1.0]; y.len()];

    let full = fit_random_intercept(y, &full_design, clusters)?;
    let null = fit_random_intercept(y, &null_design, clusters)?;
    let statistic = (2.0 * (full.log_likelihood - null.log_likelihood)).max(0.0);
    let df = extra as f64;

    let mut warnings = Vec::new();
    if !(full.converged && null.converged) {
        warnings.push("model failed to converge".to_string());
    }
    Ok(TestOutcome {
        statistic: Some(statistic),
        parameter: Some(df),
        p_value: chisq_sf(statistic, df),
        method: None,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_sample() -> (Vec<f64>, Vec<Vec<f64>>, Vec<usize>) {
        // Outcome strongly tied to x, six clusters of eight.
        let mut y = Vec::new();
        let mut x = Vec::new();
        let mut cluster = Vec::new();
        for c in 0..6 {
            for k in 0..8 {
                let xv = k as f64 - 3.5;
                let flip = (c + k) % 7 == 0;
                let yv = if (xv > 0.0) != flip { 1.0 } else { 0.0 };
                y.push(yv);
                x.push(vec![xv]);
                cluster.push(c);
            }
        }
        (y, x, cluster)
    }

    #[test]
    fn test_logistic_start_recovers_sign() {
        let (y, x, _) = clustered_sample();
        let design: Vec<Vec<f64>> = x.iter().map(|r| vec![1.0, r[0]]).collect();
        let beta = logistic_start(&y, &design);
        assert!(beta[1] > 0.0);
    }

    #[test]
    fn test_lrt_detects_association() {
        let (y, x, cluster) = clustered_sample();
        let out = random_intercept_lrt(&y, &x, &cluster).unwrap();
        assert_eq!(out.parameter, Some(1.0));
        assert!(out.p_value < 0.001);
    }

    #[test]
    fn test_rejects_non_binary_outcome() {
        let err = fit_random_intercept(&[0.0, 2.0], &[vec![1.0], vec![1.0]], &[0, 1]).unwrap_err();
        assert!(matches!(err, StatsError::InvalidArgument { .. }));
    }

    #[test]
    fn test_requires_two_clusters() {
        let err = fit_random_intercept(&[0.0, 1.0], &[vec![1.0], vec![1.0]], &[0, 0]).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData { .. }));
    }
}
