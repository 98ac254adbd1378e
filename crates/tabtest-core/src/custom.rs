//! Caller-supplied test functions.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use polars::prelude::DataFrame;
use serde_json::{Map, Value};
use tabtest_model::{DesignSpec, SummaryType, TestArgs, TestResult};

use crate::error::{AddPError, Result};

/// Everything a custom test is called with.
#[derive(Debug, Clone, Copy)]
pub struct CustomTestInput<'a> {
    /// The flat dataset (for survey tables, the design's data).
    pub data: &'a DataFrame,
    /// The survey design, for survey tables.
    pub design: Option<&'a DesignSpec>,
    pub variable: &'a str,
    pub by: &'a str,
    pub group: Option<&'a str>,
    pub summary_type: SummaryType,
    pub args: &'a TestArgs,
}

/// Return value of a custom test: a JSON object with at least a numeric
/// `p` and a string `test`.
pub type CustomOutput = std::result::Result<Map<String, Value>, Box<dyn Error + Send + Sync>>;

type CustomFn = dyn Fn(&CustomTestInput<'_>) -> CustomOutput + Send + Sync;

/// A named custom test function.
#[derive(Clone)]
pub struct CustomTest {
    name: String,
    func: Arc<CustomFn>,
}

impl fmt::Debug for CustomTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTest")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CustomTest {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&CustomTestInput<'_>) -> CustomOutput + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, input: &CustomTestInput<'_>) -> CustomOutput {
        (self.func)(input)
    }
}

fn optional_number(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

/// Check a custom test's output and turn it into a [`TestResult`].
pub(crate) fn validate_output(
    variable: &str,
    test: &str,
    output: &Map<String, Value>,
) -> Result<TestResult> {
    let violation = |detail: String| AddPError::ContractViolation {
        variable: variable.to_string(),
        test: test.to_string(),
        detail,
    };
    let p = match output.get("p") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| violation(format!("`p` is not representable as a number: {n}")))?,
        Some(other) => return Err(violation(format!("`p` must be a number, got {other}"))),
        None => return Err(violation("missing field `p`".to_string())),
    };
    let label = match output.get("test") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(violation(format!("`test` must be a string, got {other}"))),
        None => return Err(violation("missing field `test`".to_string())),
    };
    Ok(TestResult {
        p_value: Some(p),
        label: Some(label),
        statistic: optional_number(output, "statistic"),
        parameter: optional_number(output, "parameter"),
    })
}
