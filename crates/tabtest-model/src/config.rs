//! Configuration threaded through p-value augmentation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::PvalueFormatter;

/// What to do when a single variable's test fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Abort the whole call.
    #[default]
    Abort,
    /// Record a missing p-value for that variable and continue.
    Isolate,
}

/// P-value display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvalueStyle {
    pub digits: u8,
}

impl Default for PvalueStyle {
    fn default() -> Self {
        Self { digits: 1 }
    }
}

impl PvalueStyle {
    pub fn formatter(&self) -> Result<PvalueFormatter> {
        PvalueFormatter::style(self.digits)
    }

    /// The `p=` variant used when a p-value is written into a note.
    pub fn note_formatter(&self) -> Result<PvalueFormatter> {
        PvalueFormatter::style_prepend_p(self.digits)
    }
}

/// Default test per situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestDefaults {
    /// Continuous variable, `by` with two levels.
    pub continuous_by2: String,
    /// Continuous variable, `by` with more than two levels.
    pub continuous: String,
    pub categorical: String,
    /// Categorical variable with an expected count below `min_expected`.
    pub categorical_low_count: String,
    /// Any variable when a correlation group is given.
    pub grouped: String,
    pub survey_continuous: String,
    pub survey_categorical: String,
    pub survival: String,
}

impl Default for TestDefaults {
    fn default() -> Self {
        Self {
            continuous_by2: "wilcox.test".to_string(),
            continuous: "kruskal.test".to_string(),
            categorical: "chisq.test.no.correct".to_string(),
            categorical_low_count: "fisher.test".to_string(),
            grouped: "lme4".to_string(),
            survey_continuous: "svy.wilcox.test".to_string(),
            survey_categorical: "svy.chisq.test".to_string(),
            survival: "logrank".to_string(),
        }
    }
}

/// Settings for one augmentation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabConfig {
    pub pvalue: PvalueStyle,
    pub tests: TestDefaults,
    /// Expected cell count below which categorical variables use the exact test.
    pub min_expected: f64,
    /// Run per-variable tests on the rayon thread pool.
    pub parallel: bool,
    pub on_error: OnError,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            pvalue: PvalueStyle::default(),
            tests: TestDefaults::default(),
            min_expected: 5.0,
            parallel: true,
            on_error: OnError::Abort,
        }
    }
}

impl TabConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
