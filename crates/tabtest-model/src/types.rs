//! Small enums shared by the table model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// How a variable is summarised in the table body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Continuous,
    /// Continuous, reported over several rows.
    Continuous2,
    Categorical,
    Dichotomous,
}

impl SummaryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Continuous2 => "continuous2",
            Self::Categorical => "categorical",
            Self::Dichotomous => "dichotomous",
        }
    }

    pub fn is_continuous(self) -> bool {
        matches!(self, Self::Continuous | Self::Continuous2)
    }

    /// Categorical in the broad sense: categorical or dichotomous.
    pub fn is_categorical(self) -> bool {
        matches!(self, Self::Categorical | Self::Dichotomous)
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "continuous2" => Ok(Self::Continuous2),
            "categorical" => Ok(Self::Categorical),
            "dichotomous" => Ok(Self::Dichotomous),
            other => Err(ModelError::InvalidArgument {
                argument: "type",
                reason: format!("unknown summary type `{other}`"),
            }),
        }
    }
}

/// Kind of body row. P-values attach to `Label` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowType {
    Label,
    Level,
    Missing,
}

impl RowType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Level => "level",
            Self::Missing => "missing",
        }
    }
}

/// The four table kinds that can receive p-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Summary,
    Cross,
    Survey,
    Survival,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Cross => "cross",
            Self::Survey => "survey",
            Self::Survival => "survival",
        }
    }

    /// Name of the function that builds this kind of table.
    pub fn builder_name(self) -> &'static str {
        match self {
            Self::Summary => "tbl_summary",
            Self::Cross => "tbl_cross",
            Self::Survey => "tbl_svysummary",
            Self::Survival => "tbl_survfit",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "cross" => Ok(Self::Cross),
            "survey" => Ok(Self::Survey),
            "survival" => Ok(Self::Survival),
            other => Err(ModelError::InvalidArgument {
                argument: "kind",
                reason: format!("unknown table kind `{other}`"),
            }),
        }
    }
}
