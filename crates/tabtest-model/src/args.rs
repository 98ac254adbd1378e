//! Extra keyword arguments forwarded to a test.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ArgValue {
    /// Parse command-line text: `TRUE`/`FALSE`, numbers, else text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed {
            "TRUE" | "true" | "T" => Self::Bool(true),
            "FALSE" | "false" | "F" => Self::Bool(false),
            _ => trimmed
                .parse::<f64>()
                .map_or_else(|_| Self::Text(trimmed.trim_matches('"').to_string()), Self::Number),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Named arguments for one test call, in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestArgs(BTreeMap<String, ArgValue>);

impl TestArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// A logical argument, or `default` when absent.
    pub fn bool_or(&self, name: &'static str, default: bool) -> Result<bool> {
        match self.0.get(name) {
            None => Ok(default),
            Some(ArgValue::Bool(b)) => Ok(*b),
            Some(other) => Err(ModelError::InvalidArgument {
                argument: name,
                reason: format!("expected TRUE or FALSE, got {other}"),
            }),
        }
    }

    /// An optional logical argument.
    pub fn bool_opt(&self, name: &'static str) -> Result<Option<bool>> {
        if self.0.contains_key(name) {
            self.bool_or(name, false).map(Some)
        } else {
            Ok(None)
        }
    }

    /// A numeric argument, or `default` when absent.
    pub fn number_or(&self, name: &'static str, default: f64) -> Result<f64> {
        match self.0.get(name) {
            None => Ok(default),
            Some(ArgValue::Number(n)) => Ok(*n),
            Some(other) => Err(ModelError::InvalidArgument {
                argument: name,
                reason: format!("expected a number, got {other}"),
            }),
        }
    }

    /// A text argument, or `default` when absent.
    pub fn text_or<'a>(&'a self, name: &'static str, default: &'a str) -> Result<&'a str> {
        match self.0.get(name) {
            None => Ok(default),
            Some(ArgValue::Text(s)) => Ok(s),
            Some(other) => Err(ModelError::InvalidArgument {
                argument: name,
                reason: format!("expected text, got {other}"),
            }),
        }
    }

    /// Parse `name=value` pairs.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut args = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((name, value)) = pair.split_once('=') else {
                return Err(ModelError::InvalidArgument {
                    argument: "test.args",
                    reason: format!("expected name=value, got `{pair}`"),
                });
            };
            args.insert(name.trim(), ArgValue::parse(value));
        }
        Ok(args)
    }
}

impl fmt::Display for TestArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|(k, v)| format!("{k} = {v}")).collect();
        f.write_str(&rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values() {
        assert_eq!(ArgValue::parse("TRUE"), ArgValue::Bool(true));
        assert_eq!(ArgValue::parse("1.5"), ArgValue::Number(1.5));
        assert_eq!(ArgValue::parse("\"breslow\""), ArgValue::Text("breslow".into()));
    }

    #[test]
    fn typed_access() {
        let args = TestArgs::parse_pairs(&["var_equal=TRUE", "rho=1"]).unwrap();
        assert!(args.bool_or("var_equal", false).unwrap());
        assert_eq!(args.number_or("rho", 0.0).unwrap(), 1.0);
        assert!(args.bool_or("rho", false).is_err());
        assert_eq!(args.to_string(), "rho = 1, var_equal = TRUE");
    }

    #[test]
    fn rejects_pairs_without_equals() {
        assert!(TestArgs::parse_pairs(&["rho"]).is_err());
    }
}
