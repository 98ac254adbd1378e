//! Cox proportional hazards regression.

use tracing::debug;

use crate::dist::chisq_sf;
use crate::error::{Result, StatsError};
use crate::linalg::Matrix;
use crate::TestOutcome;

const TEST: &str = "coxph";
const MAX_ITERATIONS: usize = 20;
const TOLERANCE: f64 = 1e-9;

/// Handling of tied event times in the partial likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ties {
    #[default]
    Efron,
    Breslow,
}

impl std::str::FromStr for Ties {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "efron" => Ok(Self::Efron),
            "breslow" => Ok(Self::Breslow),
            other => Err(StatsError::InvalidArgument {
                test: TEST,
                argument: "ties",
                reason: format!("expected \"efron\" or \"breslow\", got {other:?}"),
            }),
        }
    }
}

/// The three global tests reported for a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct CoxTests {
    pub beta: Vec<f64>,
    pub log_likelihood: (f64, f64),
    pub iterations: usize,
    pub converged: bool,
    pub likelihood_ratio: TestOutcome,
    pub wald: TestOutcome,
    pub score: TestOutcome,
}

struct Evaluation {
    loglik: f64,
    gradient: Vec<f64>,
    information: Matrix,
}

struct CoxData {
    x: Vec<Vec<f64>>,
    status: Vec<bool>,
    /// Observation indices sorted by decreasing time, grouped by tied time.
    blocks: Vec<Vec<usize>>,
    ties: Ties,
}

impl CoxData {
    fn evaluate(&self, beta: &[f64]) -> Evaluation {
        let p = beta.len();
        let mut loglik = 0.0;
        let mut gradient = vec![0.0; p];
        let mut information = Matrix::zeros(p, p);

        let mut s0 = 0.0;
        let mut s1 = vec![0.0; p];
        let mut s2 = Matrix::zeros(p, p);

        for block in &self.blocks {
            let mut d0 = 0.0;
            let mut d1 = vec![0.0; p];
            let mut d2 = Matrix::zeros(p, p);
            let mut deaths = 0usize;

            for &i in block {
                let xi = &self.x[i];
                let eta: f64 = xi.iter().zip(beta).map(|(a, b)| a * b).sum();
                let risk = eta.exp();
                s0 += risk;
                for (s, v) in s1.iter_mut().zip(xi) {
                    *s += risk * v;
                }
                s2.add_outer(xi, xi, risk);
                if self.status[i] {
                    deaths += 1;
                    loglik += eta;
                    for (g, v) in gradient.iter_mut().zip(xi) {
                        *g += v;
                    }
                    d0 += risk;
                    for (s, v) in d1.iter_mut().zip(xi) {
                        *s += risk * v;
                    }
                    d2.add_outer(xi, xi, risk);
                }
            }
            if deaths == 0 {
                continue;
            }

            for l in 0..deaths {
                let frac = match self.ties {
                    Ties::Efron => l as f64 / deaths as f64,
                    Ties::Breslow => 0.0,
                };
                let a0 = s0 - frac * d0;
                let a1: Vec<f64> = s1.iter().zip(&d1).map(|(s, d)| s - frac * d).collect();
                loglik -= a0.ln();
                for (g, a) in gradient.iter_mut().zip(&a1) {
                    *g -= a / a0;
                }
                for r in 0..p {
                    for c in 0..p {
                        let a2 = s2[(r, c)] - frac * d2[(r, c)];
                        information[(r, c)] += a2 / a0 - a1[r] * a1[c] / (a0 * a0);
                    }
                }
            }
        }

        Evaluation {
            loglik,
            gradient,
            information,
        }
    }
}

/// Fit a Cox model of `(time, status)` on the covariate rows `x` and
/// return the likelihood ratio, Wald and score tests of all coefficients.
pub fn cox_tests(time: &[f64], status: &[f64], x: &[Vec<f64>], ties: Ties) -> Result<CoxTests> {
    if time.len() != status.len() || time.len() != x.len() {
        return Err(StatsError::LengthMismatch {
            test: TEST,
            left: time.len(),
            right: status.len().min(x.len()),
        });
    }
    let p = x.first().map_or(0, Vec::len);
    if p == 0 {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: "no covariates".to_string(),
        });
    }
    if !status.iter().any(|s| *s > 0.0) {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: "no events".to_string(),
        });
    }

    // Centring leaves every test unchanged and keeps exp() in range.
    let n = x.len() as f64;
    let means: Vec<f64> = (0..p)
        .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n)
        .collect();
    let centred: Vec<Vec<f64>> = x
        .iter()
        .map(|row| row.iter().zip(&means).map(|(v, m)| v - m).collect())
        .collect();

    let mut order: Vec<usize> = (0..time.len()).collect();
    order.sort_by(|&a, &b| time[b].total_cmp(&time[a]));
    let mut blocks: Vec<Vec<usize>> = Vec::new();
    for i in order {
        match blocks.last_mut() {
            Some(block) if time[block[0]] == time[i] => block.push(i),
            _ => blocks.push(vec![i]),
        }
    }

    let data = CoxData {
        x: centred,
        status: status.iter().map(|s| *s > 0.0).collect(),
        blocks,
        ties,
    };

    let initial = data.evaluate(&vec![0.0; p]);
    let initial_inverse = initial
        .information
        .inverse()
        .ok_or(StatsError::Singular { context: TEST })?;
    let score_stat = initial_inverse.quad_form(&initial.gradient);

    let mut beta = vec![0.0; p];
    let mut current = initial;
    let mut converged = false;
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let Some(step) = current.information.solve(&current.gradient) else {
            return Err(StatsError::Singular { context: TEST });
        };
        let mut candidate: Vec<f64> = beta.iter().zip(&step).map(|(b, s)| b + s).collect();
        let mut next = data.evaluate(&candidate);
        let mut halvings = 0;
        while (next.loglik.is_nan() || next.loglik < current.loglik) && halvings < 10 {
            for (c, b) in candidate.iter_mut().zip(&beta) {
                *c = (*c + b) / 2.0;
            }
            next = data.evaluate(&candidate);
            halvings += 1;
        }
        let change = (next.loglik - current.loglik).abs();
        beta = candidate;
        let done = change <= TOLERANCE * current.loglik.abs().max(1.0);
        current = next;
        if done {
            converged = true;
            break;
        }
    }
    debug!(iterations, converged, "cox model fitted");

    let loglik_null = data.evaluate(&vec![0.0; p]).loglik;
    let lrt = (2.0 * (current.loglik - loglik_null)).max(0.0);
    let wald = current.information.quad_form(&beta);
    let df = p as f64;

    let warnings = if converged {
        Vec::new()
    } else {
        vec!["Ran out of iterations and did not converge".to_string()]
    };
    let outcome = |statistic: f64| TestOutcome {
        statistic: Some(statistic),
        parameter: Some(df),
        p_value: chisq_sf(statistic, df),
        method: None,
        warnings: warnings.clone(),
    };

    Ok(CoxTests {
        likelihood_ratio: outcome(lrt),
        wald: outcome(wald),
        score: outcome(score_stat),
        beta,
        log_likelihood: (loglik_null, current.loglik),
        iterations,
        converged,
    })
}

/// Treatment-coded indicator columns for a factor with `nlevels` levels,
/// the first level being the reference.
pub fn dummy_columns(codes: &[usize], nlevels: usize) -> Vec<Vec<f64>> {
    codes
        .iter()
        .map(|&c| (1..nlevels).map(|l| if c == l { 1.0 } else { 0.0 }).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_parse() {
        assert_eq!("breslow".parse::<Ties>().unwrap(), Ties::Breslow);
        assert!("exact".parse::<Ties>().is_err());
    }

    #[test]
    fn test_dummy_columns() {
        assert_eq!(
            dummy_columns(&[0, 2, 1], 3),
            vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]]
        );
    }

    #[test]
    fn test_score_test_equals_logrank_without_ties() {
        use crate::survival::survdiff;
        let time = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let status = [1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0];
        let groups = [0, 1, 0, 0, 1, 0, 1, 1];
        let x = dummy_columns(&groups, 2);
        let cox = cox_tests(&time, &status, &x, Ties::Efron).unwrap();
        let logrank = survdiff(&time, &status, &groups, 2, 0.0).unwrap();
        let a = cox.score.statistic.unwrap();
        let b = logrank.outcome.statistic.unwrap();
        assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        assert!(cox.converged);
    }

    #[test]
    fn test_tests_agree_in_direction() {
        let time = [1.0, 2.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let status = [1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0];
        let x: Vec<Vec<f64>> = [1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0]
            .iter()
            .map(|v| vec![*v])
            .collect();
        let cox = cox_tests(&time, &status, &x, Ties::Efron).unwrap();
        assert!(cox.beta[0] > 0.0);
        assert!(cox.likelihood_ratio.statistic.unwrap() > 0.0);
        assert!(cox.wald.statistic.unwrap() > 0.0);
        assert_eq!(cox.likelihood_ratio.parameter, Some(1.0));
    }
}
