use std::sync::{Arc, Mutex};

use polars::prelude::*;
use serde_json::json;
use tabtest_core::{add_p, AddPError, AddPOptions, CustomTest, PVALUE_COLUMN};
use tabtest_model::{tbl_svysummary, DesignSpec, GtTable, Selector, SummaryOptions, TabConfig};

fn design() -> DesignSpec {
    let n = 40;
    let group: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "ctl" } else { "trt" }).collect();
    let score: Vec<Option<f64>> = (0..n)
        .map(|i| {
            if i % 13 == 5 {
                None
            } else {
                Some(((i * 29) % 47) as f64 + if i % 2 == 1 { 6.0 } else { 0.0 })
            }
        })
        .collect();
    let smoker: Vec<&str> = (0..n)
        .map(|i| if (i * 7) % 5 < 2 { "yes" } else { "no" })
        .collect();
    let weight: Vec<f64> = (0..n).map(|i| 1.0 + (i % 3) as f64).collect();
    let stratum: Vec<&str> = (0..n).map(|i| if i < n / 2 { "north" } else { "south" }).collect();
    let psu: Vec<String> = (0..n).map(|i| format!("p{}", i / 4)).collect();
    DesignSpec {
        data: DataFrame::new(vec![
            Column::new("group".into(), group),
            Column::new("score".into(), score),
            Column::new("smoker".into(), smoker),
            Column::new("w".into(), weight),
            Column::new("stratum".into(), stratum),
            Column::new("psu".into(), psu),
        ])
        .unwrap(),
        weights: "w".to_string(),
        strata: Some("stratum".to_string()),
        cluster: Some("psu".to_string()),
    }
}

fn survey_table() -> GtTable {
    tbl_svysummary(design(), &SummaryOptions::default().by("group")).unwrap()
}

fn p_of(table: &GtTable, variable: &str) -> Option<f64> {
    table
        .core()
        .meta_for(variable)?
        .result
        .as_ref()?
        .p_value
}

#[test]
fn design_aware_defaults() {
    let table = survey_table();
    let variables: Vec<String> = table.core().meta.iter().map(|m| m.variable.clone()).collect();
    assert_eq!(variables, vec!["score", "smoker"]);

    let out = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap();
    let core = out.core();
    assert_eq!(core.meta_for("score").unwrap().test.as_deref(), Some("svy.wilcox.test"));
    assert_eq!(core.meta_for("smoker").unwrap().test.as_deref(), Some("svy.chisq.test"));
    for variable in ["score", "smoker"] {
        let p = p_of(&out, variable).unwrap();
        assert!((0.0..=1.0).contains(&p), "{variable}: {p}");
    }
    insta::assert_snapshot!(
        core.header_for(PVALUE_COLUMN).unwrap().footnote.clone().unwrap(),
        @"Wilcoxon rank-sum test for complex survey samples; chi-squared test with Rao & Scott's second-order correction"
    );
}

#[test]
fn ordinary_tests_are_unknown_for_survey_tables() {
    let options = AddPOptions::new().test(Selector::names(&["score"]), "t.test");
    let err = add_p(&survey_table(), &options, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::UnknownTest { .. }));
}

#[test]
fn design_t_test_degrees_of_freedom() {
    let options = AddPOptions::new().test(Selector::names(&["score"]), "svy.t.test");
    let out = add_p(&survey_table(), &options, &TabConfig::default()).unwrap();
    let result = out.core().meta_for("score").unwrap().result.clone().unwrap();
    // 10 PSUs in 2 strata, less one for the contrast
    assert_eq!(result.parameter, Some(7.0));
}

#[test]
fn custom_tests_receive_the_design() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let custom = CustomTest::new("weights_seen", move |input| {
        *sink.lock().unwrap() = input.design.map(|d| d.weights.clone());
        match json!({"p": 0.5, "test": "Design check"}) {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err("not an object".into()),
        }
    });
    let options = AddPOptions::new()
        .include(Selector::names(&["smoker"]))
        .test(Selector::names(&["smoker"]), custom);
    let out = add_p(&survey_table(), &options, &TabConfig::default()).unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("w"));
    assert_eq!(p_of(&out, "smoker"), Some(0.5));
    assert_eq!(p_of(&out, "score"), None);
}
