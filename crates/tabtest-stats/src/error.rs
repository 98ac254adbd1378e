//! Error types for the statistics routines.

use thiserror::Error;

/// Errors raised by a statistical routine.
///
/// A routine that runs but produces an undefined statistic (for example a
/// Kruskal-Wallis test on constant data) returns `Ok` with a `NaN` p-value
/// instead; errors are reserved for inputs the routine cannot handle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// Too few observations for the test.
    #[error("{test}: not enough observations ({detail})")]
    InsufficientData { test: &'static str, detail: String },

    /// The grouping variable has the wrong number of levels.
    #[error("{test}: grouping factor must have {expected} levels, found {found}")]
    GroupCount {
        test: &'static str,
        expected: String,
        found: usize,
    },

    /// Input vectors have different lengths.
    #[error("{test}: input lengths differ ({left} vs {right})")]
    LengthMismatch {
        test: &'static str,
        left: usize,
        right: usize,
    },

    /// The data carry no information (zero variance, all ties...).
    #[error("{test}: data are essentially constant")]
    ConstantData { test: &'static str },

    /// A matrix that must be inverted is singular.
    #[error("{context}: singular matrix")]
    Singular { context: &'static str },

    /// Exact enumeration would exceed the work limit.
    #[error("{test}: table too large for exact enumeration (limit {limit} tables)")]
    TooLarge { test: &'static str, limit: u64 },

    /// An argument value is outside its domain.
    #[error("{test}: invalid `{argument}`: {reason}")]
    InvalidArgument {
        test: &'static str,
        argument: &'static str,
        reason: String,
    },
}

/// Result type for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;
