//! Tail probabilities of the reference distributions.
//!
//! Thin wrappers around `statrs` that return `NaN` instead of failing when
//! a statistic or its degrees of freedom are undefined.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

/// Upper tail `P(X >= x)` of a chi-squared distribution.
pub fn chisq_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }
    ChiSquared::new(df).map_or(f64::NAN, |d| d.sf(x))
}

/// Two-sided p-value of a t statistic.
pub fn t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    if df > 1e7 {
        return normal_two_sided(t);
    }
    StudentsT::new(0.0, 1.0, df).map_or(f64::NAN, |d| 2.0 * d.sf(t.abs()))
}

/// Upper tail `P(F >= f)` of an F distribution.
pub fn f_sf(f: f64, df1: f64, df2: f64) -> f64 {
    if f.is_nan() || df1.is_nan() || df1 <= 0.0 || df2.is_nan() || df2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    FisherSnedecor::new(df1, df2).map_or(f64::NAN, |d| d.sf(f))
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |d| d.cdf(z))
}

/// Two-sided p-value of a standard normal statistic.
pub fn normal_two_sided(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    Normal::new(0.0, 1.0).map_or(f64::NAN, |d| 2.0 * d.sf(z.abs()))
}

/// Standard normal quantile.
pub fn normal_quantile(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    Normal::new(0.0, 1.0).map_or(f64::NAN, |d| d.inverse_cdf(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_chisq_reference_values() {
        // qchisq(0.95, 1) = 3.841459
        assert!(close(chisq_sf(3.841_459, 1.0), 0.05, 1e-6));
        assert_eq!(chisq_sf(0.0, 3.0), 1.0);
        assert!(chisq_sf(1.0, 0.0).is_nan());
    }

    #[test]
    fn test_t_reference_values() {
        // qt(0.975, 10) = 2.228139
        assert!(close(t_two_sided(2.228_139, 10.0), 0.05, 1e-6));
        assert!(close(t_two_sided(-2.228_139, 10.0), 0.05, 1e-6));
    }

    #[test]
    fn test_normal_reference_values() {
        assert!(close(normal_two_sided(1.959_964), 0.05, 1e-6));
        assert!(close(normal_quantile(0.975), 1.959_964, 1e-5));
        assert!(close(normal_cdf(0.0), 0.5, 1e-12));
    }

    #[test]
    fn test_f_reference_values() {
        // qf(0.95, 2, 12) = 3.885294
        assert!(close(f_sf(3.885_294, 2.0, 12.0), 0.05, 1e-6));
        assert_eq!(f_sf(f64::INFINITY, 2.0, 12.0), 0.0);
    }
}
