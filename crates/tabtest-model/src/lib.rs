//! Table model for p-value augmentation: table kinds, metadata, header
//! records, variable selectors, p-value formatters and configuration.

pub mod args;
pub mod build;
pub mod config;
pub mod error;
pub mod format;
pub mod selector;
pub mod table;
pub mod types;

pub use args::{ArgValue, TestArgs};
pub use build::{
    infer_summary_type, tbl_cross, tbl_summary, tbl_survfit, tbl_svysummary, SummaryOptions,
    OVERALL_VARIABLE, UNKNOWN_LEVEL,
};
pub use config::{OnError, PvalueStyle, TabConfig, TestDefaults};
pub use error::{ModelError, Result};
pub use format::{style_pvalue, PvalueFormatter};
pub use selector::Selector;
pub use table::{
    CallRecord, CrossTable, DesignSpec, GtTable, HeaderRecord, SummaryTable, SurvFit, SurvFormula,
    SurveyTable, SurvivalTable, TableCore, TestResult, VariableMeta,
};
pub use types::{RowType, SummaryType, TableKind};
