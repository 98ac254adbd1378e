use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised while building or querying a table.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("dataframe error: {message}")]
    DataFrame { message: String },

    #[error("column `{column}` not found in the data")]
    UnknownColumn { column: String },

    #[error("invalid selector `{expression}`: {reason}")]
    Selector { expression: String, reason: String },

    #[error("invalid `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<PolarsError> for ModelError {
    fn from(err: PolarsError) -> Self {
        ModelError::DataFrame {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
