//! Small dense matrices for the model fits.
//!
//! Every model in this crate has at most a handful of parameters, so a
//! row-major `Vec<f64>` with Gauss-Jordan inversion is all that is needed.

use std::ops::{Index, IndexMut};

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            debug_assert_eq!(row.len(), cols);
            data.extend_from_slice(row);
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow one row.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                t[(j, i)] = self[(i, j)];
            }
        }
        t
    }

    /// Matrix product `self * other`.
    pub fn mul(&self, other: &Self) -> Self {
        debug_assert_eq!(self.cols, other.rows);
        let mut out = Self::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out[(i, j)] += a * other[(k, j)];
                }
            }
        }
        out
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(self.cols, v.len());
        (0..self.rows)
            .map(|i| self.row(i).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// Quadratic form `v' M v`.
    pub fn quad_form(&self, v: &[f64]) -> f64 {
        self.mul_vec(v).iter().zip(v).map(|(a, b)| a * b).sum()
    }

    pub fn trace(&self) -> f64 {
        (0..self.rows.min(self.cols)).map(|i| self[(i, i)]).sum()
    }

    /// Add `scale * u v'` in place.
    pub fn add_outer(&mut self, u: &[f64], v: &[f64], scale: f64) {
        for (i, ui) in u.iter().enumerate() {
            for (j, vj) in v.iter().enumerate() {
                self[(i, j)] += scale * ui * vj;
            }
        }
    }

    /// Scale every entry.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|x| x * factor).collect(),
        }
    }

    /// Sub-matrix of the given row and column indices.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Self {
        let mut out = Self::zeros(rows.len(), cols.len());
        for (a, &i) in rows.iter().enumerate() {
            for (b, &j) in cols.iter().enumerate() {
                out[(a, b)] = self[(i, j)];
            }
        }
        out
    }

    /// Inverse by Gauss-Jordan elimination with partial pivoting.
    ///
    /// Returns `None` for non-square or numerically singular matrices.
    pub fn inverse(&self) -> Option<Self> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Self::identity(n);
        let scale = self
            .data
            .iter()
            .fold(0.0_f64, |acc, x| acc.max(x.abs()))
            .max(f64::MIN_POSITIVE);

        for col in 0..n {
            let pivot = (col..n).max_by(|&x, &y| a[(x, col)].abs().total_cmp(&a[(y, col)].abs()))?;
            if a[(pivot, col)].abs() <= 1e-12 * scale {
                return None;
            }
            if pivot != col {
                a.swap_rows(pivot, col);
                inv.swap_rows(pivot, col);
            }
            let p = a[(col, col)];
            for j in 0..n {
                a[(col, j)] /= p;
                inv[(col, j)] /= p;
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a[(row, col)];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n {
                    a[(row, j)] -= factor * a[(col, j)];
                    inv[(row, j)] -= factor * inv[(col, j)];
                }
            }
        }
        Some(inv)
    }

    /// Solve `self * x = b`.
    pub fn solve(&self, b: &[f64]) -> Option<Vec<f64>> {
        self.inverse().map(|inv| inv.mul_vec(b))
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_round_trip() {
        let m = Matrix::from_rows(&[
            vec![4.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.2],
            vec![0.5, 0.2, 2.0],
        ]);
        let inv = m.inverse().unwrap();
        let product = m.mul(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product[(i, j)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert!(m.inverse().is_none());
    }

    #[test]
    fn test_pivoting_handles_zero_diagonal() {
        let m = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]);
        let x = m.solve(&[3.0, 5.0]).unwrap();
        assert_eq!(x, vec![5.0, 3.0]);
    }

    #[test]
    fn test_quad_form_and_trace() {
        let m = Matrix::from_rows(&[vec![2.0, 0.0], vec![0.0, 3.0]]);
        assert_eq!(m.quad_form(&[1.0, 2.0]), 14.0);
        assert_eq!(m.trace(), 5.0);
    }
}
