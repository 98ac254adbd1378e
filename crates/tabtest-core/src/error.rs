//! Errors raised while adding p-values.

use polars::prelude::PolarsError;
use tabtest_model::{ModelError, SummaryType, TableKind};
use tabtest_stats::StatsError;
use thiserror::Error;

/// Why a single test could not be computed.
#[derive(Debug, Error)]
pub enum TestFailure {
    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("data error: {0}")]
    Data(String),

    #[error(transparent)]
    Argument(#[from] ModelError),

    #[error("custom test failed: {0}")]
    Custom(String),
}

impl From<PolarsError> for TestFailure {
    fn from(err: PolarsError) -> Self {
        TestFailure::Data(err.to_string())
    }
}

/// Errors from an augmentation call.
///
/// Configuration errors are raised before any test runs; execution and
/// contract errors abort the call while tests are running.
#[derive(Debug, Error)]
pub enum AddPError {
    #[error("cannot add p-values: the table has no `by` variable to compare across")]
    MissingBy,

    #[error("invalid `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    #[error("unknown test `{test}` for variable `{variable}` in a {kind} table")]
    UnknownTest {
        variable: String,
        test: String,
        kind: TableKind,
    },

    #[error("test `{test}` cannot be used for {summary_type} variable `{variable}`")]
    TestNotApplicable {
        variable: String,
        test: String,
        summary_type: SummaryType,
    },

    #[error("test `{test}` does not accept additional arguments (variable `{variable}`: {args})")]
    ArgsNotAccepted {
        variable: String,
        test: String,
        args: String,
    },

    #[error("invalid `{argument}` selector: {source}")]
    Selector {
        argument: &'static str,
        #[source]
        source: ModelError,
    },

    #[error("test `{test}` failed for variable `{variable}`: {source}")]
    Execution {
        variable: String,
        test: String,
        #[source]
        source: TestFailure,
    },

    #[error(
        "custom test `{test}` for variable `{variable}` must return a numeric `p` and a string `test`: {detail}"
    )]
    ContractViolation {
        variable: String,
        test: String,
        detail: String,
    },

    #[error("dataframe error: {message}")]
    DataFrame { message: String },
}

impl AddPError {
    /// True for errors detected before any test executes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingBy
                | Self::InvalidArgument { .. }
                | Self::UnknownTest { .. }
                | Self::TestNotApplicable { .. }
                | Self::ArgsNotAccepted { .. }
                | Self::Selector { .. }
        )
    }
}

impl From<PolarsError> for AddPError {
    fn from(err: PolarsError) -> Self {
        AddPError::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AddPError>;
