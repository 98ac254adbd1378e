//! Derivative-free minimisation (Nelder-Mead simplex).

/// Stopping rules for [`nelder_mead`].
#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    /// Initial step along each axis.
    pub step: f64,
    /// Stop once the spread of function values across the simplex falls
    /// below this (relative to the best value).
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            step: 0.5,
            tolerance: 1e-10,
            max_iterations: 5_000,
        }
    }
}

/// Result of a minimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

fn eval(f: &impl Fn(&[f64]) -> f64, x: &[f64]) -> f64 {
    let v = f(x);
    if v.is_nan() { f64::INFINITY } else { v }
}

/// Minimise `f` from `start` with the Nelder-Mead simplex method.
///
/// Non-finite function values are treated as `+inf`, so `f` may signal an
/// infeasible point by returning `NaN`.
pub fn nelder_mead(
    f: impl Fn(&[f64]) -> f64,
    start: &[f64],
    options: SimplexOptions,
) -> Minimum {
    let n = start.len();
    if n == 0 {
        return Minimum {
            point: Vec::new(),
            value: eval(&f, start),
            iterations: 0,
            converged: true,
        };
    }

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.to_vec());
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += if vertex[i].abs() > 1e-8 {
            options.step * vertex[i].abs().max(1.0)
        } else {
            options.step
        };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(&f, v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iterations {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let spread = (values[n] - values[0]).abs();
        if spread <= options.tolerance * (values[0].abs() + options.tolerance) {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + t * (w - c))
                .collect()
        };

        let reflected = along(-1.0);
        let fr = eval(&f, &reflected);
        if fr < values[0] {
            let expanded = along(-2.0);
            let fe = eval(&f, &expanded);
            if fe < fr {
                simplex[n] = expanded;
                values[n] = fe;
            } else {
                simplex[n] = reflected;
                values[n] = fr;
            }
            continue;
        }
        if fr < values[n - 1] {
            simplex[n] = reflected;
            values[n] = fr;
            continue;
        }

        let (contracted, fc) = if fr < values[n] {
            let c = along(-0.5);
            let v = eval(&f, &c);
            (c, v)
        } else {
            let c = along(0.5);
            let v = eval(&f, &c);
            (c, v)
        };
        if fc < values[n].min(fr) {
            simplex[n] = contracted;
            values[n] = fc;
            continue;
        }

        let best = simplex[0].clone();
        for (vertex, value) in simplex.iter_mut().zip(values.iter_mut()).skip(1) {
            for (x, b) in vertex.iter_mut().zip(&best) {
                *x = b + 0.5 * (*x - b);
            }
            *value = eval(&f, vertex);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2) + 1.0;
        let min = nelder_mead(f, &[0.0, 0.0], SimplexOptions::default());
        assert!(min.converged);
        assert!((min.point[0] - 3.0).abs() < 1e-3);
        assert!((min.point[1] + 1.0).abs() < 1e-3);
        assert!((min.value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rosenbrock() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let options = SimplexOptions {
            tolerance: 1e-14,
            ..SimplexOptions::default()
        };
        let min = nelder_mead(f, &[-1.2, 1.0], options);
        assert!((min.point[0] - 1.0).abs() < 1e-2);
        assert!((min.point[1] - 1.0).abs() < 2e-2);
    }

    #[test]
    fn test_nan_is_infeasible() {
        let f = |x: &[f64]| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) };
        let min = nelder_mead(f, &[2.0], SimplexOptions::default());
        assert!((min.point[0] - 1.0).abs() < 1e-3);
    }
}
