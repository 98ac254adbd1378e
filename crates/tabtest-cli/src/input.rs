//! Loading CSV data and turning command-line text into tables and options.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use polars::prelude::{CsvReadOptions, DataFrame, SerReader};
use tabtest_model::{
    DesignSpec, GtTable, Selector, SummaryOptions, SummaryType, TableKind, TestArgs, tbl_cross,
    tbl_summary, tbl_survfit, tbl_svysummary,
};

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .with_context(|| format!("read {}", path.display()))
}

/// What table to build from the data.
#[derive(Debug, Clone)]
pub struct TableRequest {
    pub kind: TableKind,
    pub by: Vec<String>,
    pub row: Option<String>,
    pub variables: Vec<String>,
    pub types: Vec<(String, SummaryType)>,
    pub weights: Option<String>,
    pub strata: Option<String>,
    pub cluster: Option<String>,
    pub time: Option<String>,
    pub status: Option<String>,
}

impl TableRequest {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            by: Vec::new(),
            row: None,
            variables: Vec::new(),
            types: Vec::new(),
            weights: None,
            strata: None,
            cluster: None,
            time: None,
            status: None,
        }
    }

    fn single_by(&self) -> Result<Option<String>> {
        match self.by.as_slice() {
            [] => Ok(None),
            [by] => Ok(Some(by.clone())),
            _ => bail!("--by takes a single variable for {} tables", self.kind),
        }
    }

    fn summary_options(&self) -> Result<SummaryOptions> {
        let mut options = SummaryOptions::default();
        if let Some(by) = self.single_by()? {
            options = options.by(by);
        }
        if !self.variables.is_empty() {
            options = options.include(&self.variables);
        }
        for (variable, summary_type) in &self.types {
            options = options.summary_type(variable.clone(), *summary_type);
        }
        Ok(options)
    }
}

fn required<'a>(value: Option<&'a String>, flag: &str, kind: TableKind) -> Result<&'a str> {
    value
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{flag} is required for {kind} tables"))
}

/// Build the requested table.
pub fn build_table(data: DataFrame, request: &TableRequest) -> Result<GtTable> {
    let kind = request.kind;
    let table = match kind {
        TableKind::Summary => tbl_summary(data, &request.summary_options()?),
        TableKind::Cross => {
            let row = required(request.row.as_ref(), "--row", kind)?;
            let col = request
                .single_by()?
                .ok_or_else(|| anyhow!("--by is required for cross tables"))?;
            tbl_cross(data, row, &col)
        }
        TableKind::Survey => {
            let design = DesignSpec {
                data,
                weights: required(request.weights.as_ref(), "--weights", kind)?.to_string(),
                strata: request.strata.clone(),
                cluster: request.cluster.clone(),
            };
            tbl_svysummary(design, &request.summary_options()?)
        }
        TableKind::Survival => tbl_survfit(
            data,
            required(request.time.as_ref(), "--time", kind)?,
            required(request.status.as_ref(), "--status", kind)?,
            &request.by,
        ),
    };
    table.with_context(|| format!("build {kind} table"))
}

/// Split `left=right` at the first `=`.
pub fn split_pair<'a>(text: &'a str, what: &str) -> Result<(&'a str, &'a str)> {
    text.split_once('=')
        .map(|(l, r)| (l.trim(), r.trim()))
        .filter(|(l, r)| !l.is_empty() && !r.is_empty())
        .ok_or_else(|| anyhow!("expected {what}, got `{text}`"))
}

/// `SELECTOR=TEST`.
pub fn parse_test(text: &str) -> Result<(Selector, String)> {
    let (selector, test) = split_pair(text, "SELECTOR=TEST")?;
    let selector = Selector::parse(selector).with_context(|| format!("--test {text}"))?;
    Ok((selector, test.to_string()))
}

/// `SELECTOR:NAME=VALUE`.
pub fn parse_test_arg(text: &str) -> Result<(Selector, TestArgs)> {
    let (selector, pair) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected SELECTOR:NAME=VALUE, got `{text}`"))?;
    let selector = Selector::parse(selector.trim()).with_context(|| format!("--test-arg {text}"))?;
    let args = TestArgs::parse_pairs(&[pair]).with_context(|| format!("--test-arg {text}"))?;
    Ok((selector, args))
}

/// `VAR=TYPE`.
pub fn parse_type(text: &str) -> Result<(String, SummaryType)> {
    let (variable, summary_type) = split_pair(text, "VAR=TYPE")?;
    let summary_type = summary_type
        .parse::<SummaryType>()
        .with_context(|| format!("--type {text}"))?;
    Ok((variable.to_string(), summary_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let (selector, test) = parse_test("all_continuous()=t.test").unwrap();
        assert_eq!(selector.as_str(), "all_continuous()");
        assert_eq!(test, "t.test");
        assert!(parse_test("t.test").is_err());
    }

    #[test]
    fn parses_test_args() {
        let (selector, args) = parse_test_arg("age:var_equal=TRUE").unwrap();
        assert_eq!(selector.as_str(), "age");
        assert_eq!(args.to_string(), "var_equal = TRUE");
        assert!(parse_test_arg("var_equal=TRUE").is_err());
    }

    #[test]
    fn parses_types() {
        assert_eq!(
            parse_type("age = continuous").unwrap(),
            ("age".to_string(), SummaryType::Continuous)
        );
        assert!(parse_type("age=numeric").is_err());
    }

    #[test]
    fn survival_needs_time_and_status() {
        let df = DataFrame::empty();
        let err = build_table(df, &TableRequest::new(TableKind::Survival)).unwrap_err();
        assert!(err.to_string().contains("--time"));
    }
}
