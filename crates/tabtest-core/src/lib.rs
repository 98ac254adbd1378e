//! Adding p-values to summary tables.
//!
//! [`add_p`] resolves one test per variable (caller overrides first, then
//! the data-driven defaults in [`TabConfig`](tabtest_model::TabConfig)),
//! runs the tests and merges the p-values and test labels back into the
//! table. Summary, cross, survey and survival tables each have their own
//! entry point built from the same stages.

pub mod add_p;
pub mod assign;
pub mod custom;
pub mod error;
mod execute;
pub mod merge;
pub mod options;
pub mod registry;
mod slice;
mod survival;

pub use add_p::{add_p, add_p_cross, add_p_summary, add_p_survey, add_p_survival, Phase};
pub use assign::{AssignedTest, Assignment};
pub use custom::{CustomOutput, CustomTest, CustomTestInput};
pub use error::{AddPError, Result, TestFailure};
pub use merge::PVALUE_COLUMN;
pub use options::{AddPOptions, TestChoice};
pub use registry::{lookup, registry, Applies, CoxStatistic, Method, TestSpec};
