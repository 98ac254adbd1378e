//! Arguments of an augmentation call.

use tabtest_model::{PvalueFormatter, Selector, TestArgs};

use crate::custom::CustomTest;

/// Test requested for the variables matched by a selector.
#[derive(Debug, Clone)]
pub enum TestChoice {
    /// A built-in test id, such as `"t.test"`.
    Builtin(String),
    Custom(CustomTest),
}

impl TestChoice {
    pub fn id(&self) -> &str {
        match self {
            Self::Builtin(id) => id,
            Self::Custom(custom) => custom.name(),
        }
    }
}

impl From<&str> for TestChoice {
    fn from(id: &str) -> Self {
        Self::Builtin(id.to_string())
    }
}

impl From<CustomTest> for TestChoice {
    fn from(custom: CustomTest) -> Self {
        Self::Custom(custom)
    }
}

/// Options for `add_p`. Every field defaults to "not given".
#[derive(Debug, Clone, Default)]
pub struct AddPOptions {
    /// `(selector, test)` overrides; for each variable the last matching
    /// entry wins.
    pub tests: Vec<(Selector, TestChoice)>,
    /// `(selector, arguments)` forwarded to the tests; later entries add to
    /// and replace earlier ones.
    pub test_args: Vec<(Selector, TestArgs)>,
    /// Correlation group for clustered or paired tests.
    pub group: Option<String>,
    /// Variables to test; every variable when `None`.
    pub include: Option<Selector>,
    /// Deprecated: variables to leave untested. Prefer a negated `include`.
    pub exclude: Option<Selector>,
    /// P-value formatter; the configured style when `None`.
    pub pvalue_fun: Option<PvalueFormatter>,
    /// Cross tables: report the test in a source note instead of a column.
    pub source_note: bool,
    /// Survival tables: do not log the constructed test call.
    pub quiet: bool,
}

impl AddPOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn test(mut self, selector: Selector, test: impl Into<TestChoice>) -> Self {
        self.tests.push((selector, test.into()));
        self
    }

    pub fn test_args(mut self, selector: Selector, args: TestArgs) -> Self {
        self.test_args.push((selector, args));
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn include(mut self, selector: Selector) -> Self {
        self.include = Some(selector);
        self
    }

    pub fn exclude(mut self, selector: Selector) -> Self {
        self.exclude = Some(selector);
        self
    }

    pub fn pvalue_fun(mut self, formatter: PvalueFormatter) -> Self {
        self.pvalue_fun = Some(formatter);
        self
    }

    pub fn source_note(mut self, source_note: bool) -> Self {
        self.source_note = source_note;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// `name = value` pairs for the audit record.
    pub(crate) fn audit_arguments(&self) -> Vec<(String, String)> {
        let mut args = Vec::new();
        if !self.tests.is_empty() {
            let rendered: Vec<String> = self
                .tests
                .iter()
                .map(|(s, t)| format!("{s} ~ \"{}\"", t.id()))
                .collect();
            args.push(("test".to_string(), format!("list({})", rendered.join(", "))));
        }
        if !self.test_args.is_empty() {
            let rendered: Vec<String> = self
                .test_args
                .iter()
                .map(|(s, a)| format!("{s} ~ list({a})"))
                .collect();
            args.push(("test.args".to_string(), format!("list({})", rendered.join(", "))));
        }
        if let Some(group) = &self.group {
            args.push(("group".to_string(), group.clone()));
        }
        if let Some(include) = &self.include {
            args.push(("include".to_string(), include.to_string()));
        }
        if let Some(exclude) = &self.exclude {
            args.push(("exclude".to_string(), exclude.to_string()));
        }
        if let Some(fun) = &self.pvalue_fun {
            args.push(("pvalue_fun".to_string(), fun.name().to_string()));
        }
        if self.source_note {
            args.push(("source_note".to_string(), "TRUE".to_string()));
        }
        if self.quiet {
            args.push(("quiet".to_string(), "TRUE".to_string()));
        }
        args
    }
}
