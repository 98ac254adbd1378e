//! Variable selectors: `everything()`, `all_continuous()`, names, negation.
//!
//! A selector expression is a comma-separated list of terms. Terms prefixed
//! with `-` remove variables; if an expression only removes, it starts from
//! every variable.

use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::types::SummaryType;

/// One selection term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Everything,
    AllContinuous,
    AllContinuous2,
    /// Categorical variables, optionally including dichotomous ones.
    AllCategorical { dichotomous: bool },
    AllDichotomous,
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Name(String),
}

impl Term {
    fn matches(&self, name: &str, summary_type: SummaryType) -> bool {
        match self {
            Self::Everything => true,
            Self::AllContinuous => summary_type.is_continuous(),
            Self::AllContinuous2 => summary_type == SummaryType::Continuous2,
            Self::AllCategorical { dichotomous } => {
                summary_type == SummaryType::Categorical
                    || (*dichotomous && summary_type == SummaryType::Dichotomous)
            }
            Self::AllDichotomous => summary_type == SummaryType::Dichotomous,
            Self::StartsWith(prefix) => name.starts_with(prefix.as_str()),
            Self::EndsWith(suffix) => name.ends_with(suffix.as_str()),
            Self::Contains(part) => name.contains(part.as_str()),
            Self::Name(n) => n == name,
        }
    }
}

/// A parsed selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    terms: Vec<(bool, Term)>,
}

fn selector_error(expression: &str, reason: impl Into<String>) -> ModelError {
    ModelError::Selector {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('`').and_then(|r| r.strip_suffix('`')))
        .unwrap_or(s)
}

/// Split on commas that are not inside parentheses or quotes.
fn split_terms(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

fn parse_term(expression: &str, raw: &str) -> Result<Term> {
    let raw = raw.trim();
    let Some(open) = raw.find('(') else {
        let name = unquote(raw);
        if name.is_empty() {
            return Err(selector_error(expression, "empty term"));
        }
        return Ok(Term::Name(name.to_string()));
    };
    let Some(inner) = raw[open + 1..].strip_suffix(')') else {
        return Err(selector_error(expression, format!("unbalanced parentheses in `{raw}`")));
    };
    let func = raw[..open].trim();
    let arg = inner.trim();
    let needs_text = |term: fn(String) -> Term| -> Result<Term> {
        let text = unquote(arg);
        if text.is_empty() {
            Err(selector_error(expression, format!("`{func}()` needs an argument")))
        } else {
            Ok(term(text.to_string()))
        }
    };
    match func {
        "everything" => Ok(Term::Everything),
        "all_continuous" => Ok(Term::AllContinuous),
        "all_continuous2" => Ok(Term::AllContinuous2),
        "all_dichotomous" => Ok(Term::AllDichotomous),
        "all_categorical" => {
            let dichotomous = match arg.replace(' ', "").as_str() {
                "" | "dichotomous=TRUE" | "TRUE" => true,
                "dichotomous=FALSE" | "FALSE" => false,
                other => {
                    return Err(selector_error(
                        expression,
                        format!("unsupported argument `{other}` to all_categorical()"),
                    ));
                }
            };
            Ok(Term::AllCategorical { dichotomous })
        }
        "starts_with" => needs_text(Term::StartsWith),
        "ends_with" => needs_text(Term::EndsWith),
        "contains" => needs_text(Term::Contains),
        "c" => Err(selector_error(expression, "use a comma-separated list instead of c()")),
        other => Err(selector_error(expression, format!("unknown selector function `{other}()`"))),
    }
}

impl Selector {
    /// Parse a selector expression.
    pub fn parse(expression: &str) -> Result<Self> {
        if expression.trim().is_empty() {
            return Err(selector_error(expression, "empty selector"));
        }
        let mut terms = Vec::new();
        for raw in split_terms(expression) {
            let raw = raw.trim();
            let (negated, body) = match raw.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            terms.push((negated, parse_term(expression, body)?));
        }
        Ok(Self {
            source: expression.trim().to_string(),
            terms,
        })
    }

    /// Selector matching every variable.
    pub fn everything() -> Self {
        Self {
            source: "everything()".to_string(),
            terms: vec![(false, Term::Everything)],
        }
    }

    /// Selector for an explicit list of names.
    pub fn names<S: AsRef<str>>(names: &[S]) -> Self {
        let terms: Vec<(bool, Term)> = names
            .iter()
            .map(|n| (false, Term::Name(n.as_ref().to_string())))
            .collect();
        let source = names
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(", ");
        Self { source, terms }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Resolve against the table's variables, keeping table order.
    ///
    /// Names that do not exist are an error. A selector may legitimately
    /// match nothing (for example `all_continuous()` on an all-categorical
    /// table).
    pub fn resolve(&self, variables: &[(String, SummaryType)]) -> Result<Vec<String>> {
        for (_, term) in &self.terms {
            if let Term::Name(name) = term {
                if !variables.iter().any(|(v, _)| v == name) {
                    return Err(selector_error(
                        &self.source,
                        format!("variable `{name}` is not in the table"),
                    ));
                }
            }
        }
        let has_positive = self.terms.iter().any(|(negated, _)| !negated);
        let selected = variables
            .iter()
            .filter(|(name, st)| {
                let included = !has_positive
                    || self
                        .terms
                        .iter()
                        .any(|(negated, t)| !negated && t.matches(name, *st));
                let excluded = self
                    .terms
                    .iter()
                    .any(|(negated, t)| *negated && t.matches(name, *st));
                included && !excluded
            })
            .map(|(name, _)| name.clone())
            .collect();
        Ok(selected)
    }
}

impl FromStr for Selector {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vec<(String, SummaryType)> {
        vec![
            ("age".to_string(), SummaryType::Continuous),
            ("grade".to_string(), SummaryType::Categorical),
            ("response".to_string(), SummaryType::Dichotomous),
            ("marker".to_string(), SummaryType::Continuous),
        ]
    }

    fn resolve(expr: &str) -> Vec<String> {
        Selector::parse(expr).unwrap().resolve(&vars()).unwrap()
    }

    #[test]
    fn type_selectors() {
        assert_eq!(resolve("all_continuous()"), vec!["age", "marker"]);
        assert_eq!(resolve("all_categorical()"), vec!["grade", "response"]);
        assert_eq!(
            resolve("all_categorical(dichotomous = FALSE)"),
            vec!["grade"]
        );
        assert_eq!(resolve("all_dichotomous()"), vec!["response"]);
    }

    #[test]
    fn names_and_negation_keep_table_order() {
        assert_eq!(resolve("marker, age"), vec!["age", "marker"]);
        assert_eq!(resolve("-grade"), vec!["age", "response", "marker"]);
        assert_eq!(resolve("everything(), -all_continuous()"), vec!["grade", "response"]);
        assert_eq!(resolve("starts_with(\"ma\")"), vec!["marker"]);
    }

    #[test]
    fn unknown_names_and_functions_fail() {
        let err = Selector::parse("weight").unwrap().resolve(&vars()).unwrap_err();
        assert!(err.to_string().contains("weight"));
        assert!(Selector::parse("all_things()").is_err());
        assert!(Selector::parse("  ").is_err());
        assert!(Selector::parse("age,").is_err());
    }
}
