use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use polars::prelude::*;
use serde_json::Map;
use tabtest_core::{add_p, AddPError, AddPOptions, CustomTest, PVALUE_COLUMN};
use tabtest_model::{
    tbl_survfit, ArgValue, GtTable, OnError, Selector, TabConfig, TestArgs, OVERALL_VARIABLE,
};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

fn trial() -> DataFrame {
    DataFrame::new(vec![
        Column::new(
            "time".into(),
            vec![
                5.0, 8.0, 12.0, 15.0, 20.0, 22.0, 30.0, 34.0, 40.0, 45.0, 3.0, 6.0, 7.0, 10.0,
                11.0, 14.0, 18.0, 21.0, 25.0, 28.0,
            ],
        ),
        Column::new(
            "status".into(),
            vec![1, 0, 1, 1, 0, 1, 1, 0, 1, 0, 1, 1, 1, 0, 1, 1, 1, 1, 0, 1],
        ),
        Column::new(
            "trt".into(),
            vec![
                "Drug", "Drug", "Drug", "Drug", "Drug", "Drug", "Drug", "Drug", "Drug", "Drug",
                "Placebo", "Placebo", "Placebo", "Placebo", "Placebo", "Placebo", "Placebo",
                "Placebo", "Placebo", "Placebo",
            ],
        ),
        Column::new(
            "site".into(),
            vec![
                "a", "b", "a", "b", "a", "b", "a", "b", "a", "b", "a", "b", "a", "b", "a", "b",
                "a", "b", "a", "b",
            ],
        ),
    ])
    .unwrap()
}

fn survfit(strata: &[&str]) -> GtTable {
    tbl_survfit(trial(), "time", "status", strata).unwrap()
}

fn result_of(table: &GtTable, variable: &str) -> Option<tabtest_model::TestResult> {
    table.core().meta_for(variable)?.result.clone()
}

#[test]
fn logrank_by_default() {
    let out = add_p(&survfit(&["trt"]), &AddPOptions::new(), &TabConfig::default()).unwrap();
    let result = result_of(&out, "trt").unwrap();
    let p = result.p_value.unwrap();
    // O = 6, E = 9.2015, V = 2.7929 for the first group
    assert!((p - 0.055_404).abs() < 1e-5, "p = {p}");
    assert_eq!(result.parameter, Some(1.0));
    assert_eq!(
        out.core().header_for(PVALUE_COLUMN).unwrap().footnote.as_deref(),
        Some("Log-rank test")
    );
}

#[test]
fn every_stratified_fit_is_tested() {
    let out = add_p(
        &survfit(&["trt", "site"]),
        &AddPOptions::new().test(Selector::everything(), "petopeto_gehanwilcoxon"),
        &TabConfig::default(),
    )
    .unwrap();
    for variable in ["trt", "site"] {
        let p = result_of(&out, variable).and_then(|r| r.p_value).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
}

#[test]
fn extra_args_rejected_for_logrank() {
    let options = AddPOptions::new().test_args(
        Selector::names(&["trt"]),
        TestArgs::new().with("rho", ArgValue::Number(1.0)),
    );
    let err = add_p(&survfit(&["trt"]), &options, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::ArgsNotAccepted { ref test, .. } if test == "logrank"));
    assert!(err.is_configuration());
}

#[test]
fn survdiff_takes_rho_and_has_no_footnote() {
    let options = AddPOptions::new()
        .test(Selector::names(&["trt"]), "survdiff")
        .test_args(
            Selector::names(&["trt"]),
            TestArgs::new().with("rho", ArgValue::Number(1.0)),
        );
    let out = add_p(&survfit(&["trt"]), &options, &TabConfig::default()).unwrap();
    let survdiff = result_of(&out, "trt").unwrap();
    assert_eq!(survdiff.label, None);
    assert_eq!(out.core().header_for(PVALUE_COLUMN).unwrap().footnote, None);

    let peto = add_p(
        &survfit(&["trt"]),
        &AddPOptions::new().test(Selector::names(&["trt"]), "petopeto_gehanwilcoxon"),
        &TabConfig::default(),
    )
    .unwrap();
    assert_eq!(survdiff.p_value, result_of(&peto, "trt").unwrap().p_value);
}

#[test]
fn cox_tests_accept_ties() {
    let options = AddPOptions::new()
        .test(Selector::names(&["trt"]), "coxph_lrt")
        .test_args(
            Selector::names(&["trt"]),
            TestArgs::new().with("ties", ArgValue::Text("breslow".to_string())),
        );
    let out = add_p(&survfit(&["trt"]), &options, &TabConfig::default()).unwrap();
    let result = result_of(&out, "trt").unwrap();
    assert!(result.p_value.is_some_and(|p| p > 0.0 && p < 1.0));
    assert_eq!(result.label.as_deref(), Some("Cox regression (LRT)"));

    let bad = AddPOptions::new()
        .test(Selector::names(&["trt"]), "coxph_wald")
        .test_args(
            Selector::names(&["trt"]),
            TestArgs::new().with("ties", ArgValue::Text("exact".to_string())),
        );
    let err = add_p(&survfit(&["trt"]), &bad, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::Execution { .. }));
}

#[test]
fn unstratified_table_has_no_by() {
    let table = survfit(&[]);
    let err = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::MissingBy));

    let mixed = add_p(&survfit(&["trt"]), &AddPOptions::new(), &TabConfig::default()).unwrap();
    assert!(mixed.core().meta_for(OVERALL_VARIABLE).is_none());
}

#[test]
fn registry_is_closed_to_custom_tests() {
    let custom = CustomTest::new("mine", |_| Ok(Map::new()));
    let options = AddPOptions::new().test(Selector::names(&["trt"]), custom);
    let err = add_p(&survfit(&["trt"]), &options, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::UnknownTest { ref test, .. } if test == "mine"));
}

fn bad_ties_on_trt() -> AddPOptions {
    AddPOptions::new()
        .test(Selector::names(&["trt"]), "coxph_wald")
        .test_args(
            Selector::names(&["trt"]),
            TestArgs::new().with("ties", ArgValue::Text("exact".to_string())),
        )
}

#[test]
fn isolated_failure_keeps_other_fits() {
    let config = TabConfig {
        on_error: OnError::Isolate,
        ..TabConfig::default()
    };
    let out = add_p(&survfit(&["trt", "site"]), &bad_ties_on_trt(), &config).unwrap();
    assert_eq!(result_of(&out, "trt").unwrap().p_value, None);
    let site = result_of(&out, "site").and_then(|r| r.p_value).unwrap();
    assert!((0.0..=1.0).contains(&site));
    assert_eq!(
        out.core().header_for(PVALUE_COLUMN).unwrap().footnote.as_deref(),
        Some("Log-rank test")
    );

    let err = add_p(&survfit(&["trt", "site"]), &bad_ties_on_trt(), &TabConfig::default())
        .unwrap_err();
    assert!(matches!(err, AddPError::Execution { ref variable, .. } if variable == "trt"));
}

#[test]
fn missing_fit_is_a_configuration_error() {
    let mut table = survfit(&["trt", "site"]);
    if let GtTable::Survival(t) = &mut table {
        t.fits.retain(|f| f.variable != "site");
    }
    let err = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(err, AddPError::InvalidArgument { argument: "include", .. }));
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn logged(options: &AddPOptions) -> String {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        add_p(&survfit(&["trt", "site"]), options, &TabConfig::default()).unwrap();
    });
    let bytes = captured.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn first_call_is_logged_once() {
    let text = logged(&AddPOptions::new());
    assert_eq!(text.matches("add_p: calculating p-values with").count(), 1);
    assert!(text.contains("survdiff(formula = Surv(time, status) ~ trt, data = data, rho = 0)"));
    assert!(!text.contains("~ site"));

    let quiet = logged(&AddPOptions::new().quiet(true));
    assert!(!quiet.contains("add_p: calculating p-values with"));
}
