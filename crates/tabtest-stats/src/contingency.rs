//! Two-way contingency tables and tests of independence on them.

use statrs::function::factorial::ln_factorial;
use tracing::debug;

use crate::dist::chisq_sf;
use crate::error::{Result, StatsError};
use crate::TestOutcome;

/// Expected cell count below which the chi-squared approximation is flagged.
pub const LOW_EXPECTED: f64 = 5.0;

/// Upper bound on the number of tables visited by [`fisher_exact`].
pub const FISHER_TABLE_LIMIT: u64 = 5_000_000;

/// Cross-classified counts. Rows and columns follow the caller's level order.
#[derive(Debug, Clone, PartialEq)]
pub struct ContingencyTable {
    counts: Vec<Vec<f64>>,
    row_totals: Vec<f64>,
    col_totals: Vec<f64>,
    total: f64,
}

impl ContingencyTable {
    /// Build a table from a rectangular array of counts.
    pub fn from_counts(counts: Vec<Vec<f64>>) -> Result<Self> {
        let ncol = counts.first().map_or(0, Vec::len);
        if let Some(row) = counts.iter().find(|row| row.len() != ncol) {
            return Err(StatsError::LengthMismatch {
                test: "contingency table",
                left: ncol,
                right: row.len(),
            });
        }
        let row_totals: Vec<f64> = counts.iter().map(|r| r.iter().sum()).collect();
        let col_totals: Vec<f64> = (0..ncol)
            .map(|j| counts.iter().map(|r| r[j]).sum())
            .collect();
        let total = row_totals.iter().sum();
        Ok(Self {
            counts,
            row_totals,
            col_totals,
            total,
        })
    }

    /// Cross-tabulate paired level codes. Codes index into `nrow`/`ncol`.
    pub fn tabulate(rows: &[usize], cols: &[usize], nrow: usize, ncol: usize) -> Result<Self> {
        if rows.len() != cols.len() {
            return Err(StatsError::LengthMismatch {
                test: "contingency table",
                left: rows.len(),
                right: cols.len(),
            });
        }
        let mut counts = vec![vec![0.0; ncol]; nrow];
        for (&i, &j) in rows.iter().zip(cols) {
            if i >= nrow || j >= ncol {
                return Err(StatsError::InvalidArgument {
                    test: "contingency table",
                    argument: "codes",
                    reason: format!("level code ({i}, {j}) outside {nrow}x{ncol} table"),
                });
            }
            counts[i][j] += 1.0;
        }
        Self::from_counts(counts)
    }

    pub fn nrow(&self) -> usize {
        self.counts.len()
    }

    pub fn ncol(&self) -> usize {
        self.col_totals.len()
    }

    pub fn counts(&self) -> &[Vec<f64>] {
        &self.counts
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Expected count of cell `(i, j)` under independence.
    pub fn expected(&self, i: usize, j: usize) -> f64 {
        self.row_totals[i] * self.col_totals[j] / self.total
    }

    /// Smallest expected cell count, `NaN` for an empty table.
    pub fn min_expected(&self) -> f64 {
        if self.total <= 0.0 {
            return f64::NAN;
        }
        let mut min = f64::INFINITY;
        for i in 0..self.nrow() {
            for j in 0..self.ncol() {
                min = min.min(self.expected(i, j));
            }
        }
        min
    }

    fn require_two_by_two(&self, test: &'static str) -> Result<()> {
        if self.nrow() < 2 || self.ncol() < 2 {
            return Err(StatsError::GroupCount {
                test,
                expected: "at least 2 rows and columns, got".to_string(),
                found: self.nrow().min(self.ncol()),
            });
        }
        Ok(())
    }
}

/// Pearson's chi-squared test of independence.
///
/// With `correct`, 2x2 tables get Yates' continuity correction.
pub fn chisq_test(table: &ContingencyTable, correct: bool) -> Result<TestOutcome> {
    const TEST: &str = "chisq.test";
    table.require_two_by_two(TEST)?;

    let yates = correct && table.nrow() == 2 && table.ncol() == 2;
    let mut cells = Vec::with_capacity(table.nrow() * table.ncol());
    for (i, row) in table.counts.iter().enumerate() {
        for (j, observed) in row.iter().enumerate() {
            cells.push((*observed, table.expected(i, j)));
        }
    }
    let shift = if yates {
        cells
            .iter()
            .map(|(o, e)| (o - e).abs())
            .fold(0.5_f64, f64::min)
    } else {
        0.0
    };
    let statistic: f64 = cells
        .iter()
        .map(|(o, e)| ((o - e).abs() - shift).powi(2) / e)
        .sum();
    let df = ((table.nrow() - 1) * (table.ncol() - 1)) as f64;

    let mut warnings = Vec::new();
    if cells.iter().any(|(_, e)| *e < LOW_EXPECTED) {
        warnings.push("Chi-squared approximation may be incorrect".to_string());
    }

    Ok(TestOutcome {
        statistic: Some(statistic),
        parameter: Some(df),
        p_value: chisq_sf(statistic, df),
        method: Some(if yates {
            "Pearson's Chi-squared test with Yates' continuity correction".to_string()
        } else {
            "Pearson's Chi-squared test".to_string()
        }),
        warnings,
    })
}

struct FisherWalk<'a> {
    col_sums: &'a [u64],
    remaining: Vec<u64>,
    constant: f64,
    threshold: f64,
    p_value: f64,
    visited: u64,
}

impl FisherWalk<'_> {
    fn leaf(&mut self, log_weight: f64) -> Result<()> {
        self.visited += 1;
        if self.visited > FISHER_TABLE_LIMIT {
            return Err(StatsError::TooLarge {
                test: "fisher.test",
                limit: FISHER_TABLE_LIMIT,
            });
        }
        let log_p = self.constant + log_weight;
        if log_p <= self.threshold {
            self.p_value += log_p.exp();
        }
        Ok(())
    }

    fn walk(&mut self, col: usize, row: usize, left: u64, acc: f64) -> Result<()> {
        let nrow = self.remaining.len();
        if col + 1 == self.col_sums.len() {
            let last: f64 = self.remaining.iter().map(|&r| ln_factorial(r)).sum();
            return self.leaf(acc - last);
        }
        if row + 1 == nrow {
            if left > self.remaining[row] {
                return Ok(());
            }
            self.remaining[row] -= left;
            let next = acc - ln_factorial(left);
            let result = self.walk(col + 1, 0, self.col_sums[col + 1], next);
            self.remaining[row] += left;
            return result;
        }
        let below: u64 = self.remaining[row + 1..].iter().sum();
        let lo = left.saturating_sub(below);
        let hi = left.min(self.remaining[row]);
        for v in lo..=hi {
            self.remaining[row] -= v;
            let result = self.walk(col, row + 1, left - v, acc - ln_factorial(v));
            self.remaining[row] += v;
            result?;
        }
        Ok(())
    }
}

/// Fisher's exact test for an r x c table.
///
/// Sums the probabilities of every table with the same margins that is no
/// more likely than the observed one.
pub fn fisher_exact(table: &ContingencyTable) -> Result<TestOutcome> {
    const TEST: &str = "fisher.test";
    table.require_two_by_two(TEST)?;

    let as_int = |v: f64| v.round().max(0.0) as u64;
    let counts: Vec<Vec<u64>> = table
        .counts
        .iter()
        .map(|r| r.iter().copied().map(as_int).collect())
        .collect();
    let row_sums: Vec<u64> = counts.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<u64> = (0..table.ncol())
        .map(|j| counts.iter().map(|r| r[j]).sum())
        .collect();
    let n: u64 = row_sums.iter().sum();
    if n == 0 {
        return Err(StatsError::InsufficientData {
            test: TEST,
            detail: "empty table".to_string(),
        });
    }

    let constant = row_sums.iter().map(|&r| ln_factorial(r)).sum::<f64>()
        + col_sums.iter().map(|&c| ln_factorial(c)).sum::<f64>()
        - ln_factorial(n);
    let observed = constant
        - counts
            .iter()
            .flatten()
            .map(|&c| ln_factorial(c))
            .sum::<f64>();

    let mut walk = FisherWalk {
        col_sums: &col_sums,
        remaining: row_sums.clone(),
        constant,
        threshold: observed + (1.0 + 1e-7_f64).ln(),
        p_value: 0.0,
        visited: 0,
    };
    walk.walk(0, 0, col_sums[0], 0.0)?;
    debug!(tables = walk.visited, "fisher exact enumeration complete");

    Ok(TestOutcome {
        statistic: None,
        parameter: None,
        p_value: walk.p_value.min(1.0),
        method: Some("Fisher's Exact Test for Count Data".to_string()),
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[f64]]) -> ContingencyTable {
        ContingencyTable::from_counts(rows.iter().map(|r| r.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_expected_counts() {
        let t = table(&[&[2.0, 1.0], &[1.0, 2.0]]);
        assert_eq!(t.expected(0, 0), 1.5);
        assert_eq!(t.min_expected(), 1.5);
    }

    #[test]
    fn test_tabulate_codes() {
        let t = ContingencyTable::tabulate(&[0, 0, 1, 1], &[0, 1, 1, 1], 2, 2).unwrap();
        assert_eq!(t.counts(), &[vec![1.0, 1.0], vec![0.0, 2.0]]);
        assert!(ContingencyTable::tabulate(&[2], &[0], 2, 2).is_err());
    }

    #[test]
    fn test_chisq_without_correction() {
        // [[50,40],[45,55]]: X^2 = 19/9 on 1 df
        let t = table(&[&[50.0, 40.0], &[45.0, 55.0]]);
        let out = chisq_test(&t, false).unwrap();
        assert!((out.statistic.unwrap() - 19.0 / 9.0).abs() < 1e-9);
        assert!((out.p_value - 0.146_233).abs() < 1e-5);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_chisq_warns_on_low_expected() {
        let t = table(&[&[2.0, 1.0], &[1.0, 2.0]]);
        let out = chisq_test(&t, true).unwrap();
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_chisq_requires_two_levels() {
        let t = table(&[&[3.0, 4.0]]);
        assert!(chisq_test(&t, false).is_err());
    }

    #[test]
    fn test_fisher_small_table() {
        // fisher.test(matrix(c(2,1,1,2), 2)) has p = 1
        let t = table(&[&[2.0, 1.0], &[1.0, 2.0]]);
        let out = fisher_exact(&t).unwrap();
        assert!((out.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fisher_tea_tasting() {
        // fisher.test(matrix(c(3,1,1,3), 2)): p = 0.4857
        let t = table(&[&[3.0, 1.0], &[1.0, 3.0]]);
        let out = fisher_exact(&t).unwrap();
        assert!((out.p_value - 0.485_714_3).abs() < 1e-6);
    }

    #[test]
    fn test_fisher_three_by_two() {
        let t = table(&[&[5.0, 0.0], &[0.0, 5.0], &[2.0, 3.0]]);
        let out = fisher_exact(&t).unwrap();
        assert!(out.p_value > 0.0 && out.p_value < 0.05);
    }
}
