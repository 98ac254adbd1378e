use polars::prelude::*;
use proptest::prelude::*;
use serde_json::json;
use tabtest_core::{add_p, AddPError, AddPOptions, CustomTest, PVALUE_COLUMN};
use tabtest_model::{
    tbl_summary, GtTable, OnError, PvalueFormatter, Selector, SummaryOptions, SummaryType,
    TabConfig,
};

/// `trt` against `var`, with `counts[level][arm]` observations per cell.
fn from_counts(counts: &[[usize; 2]]) -> DataFrame {
    let mut trt = Vec::new();
    let mut var = Vec::new();
    for (level, row) in counts.iter().enumerate() {
        for (arm, n) in row.iter().enumerate() {
            for _ in 0..*n {
                trt.push(if arm == 0 { "A" } else { "B" });
                var.push(format!("level{}", level + 1));
            }
        }
    }
    let age: Vec<f64> = (0..trt.len())
        .map(|i| ((i * 37) % 101) as f64 + 0.5)
        .collect();
    DataFrame::new(vec![
        Column::new("trt".into(), trt),
        Column::new("var".into(), var),
        Column::new("age".into(), age),
    ])
    .unwrap()
}

fn summary(df: DataFrame) -> GtTable {
    let options = SummaryOptions::default()
        .by("trt")
        .summary_type("age", SummaryType::Continuous);
    tbl_summary(df, &options).unwrap()
}

fn sequential() -> TabConfig {
    TabConfig {
        parallel: false,
        ..TabConfig::default()
    }
}

fn assigned<'a>(table: &'a GtTable, variable: &str) -> Option<&'a str> {
    table.core().meta_for(variable)?.test.as_deref()
}

fn label_p(table: &GtTable, variable: &str) -> Option<f64> {
    let body = &table.core().body;
    let variables = body.column("variable").unwrap().str().unwrap();
    let row_types = body.column("row_type").unwrap().str().unwrap();
    let p = body.column(PVALUE_COLUMN).unwrap().f64().unwrap();
    (0..body.height())
        .find(|&i| variables.get(i) == Some(variable) && row_types.get(i) == Some("label"))
        .and_then(|i| p.get(i))
}

fn footnote(table: &GtTable) -> Option<String> {
    table.core().header_for(PVALUE_COLUMN)?.footnote.clone()
}

#[test]
fn low_expected_counts_default_to_exact_test() {
    let table = summary(from_counts(&[[2, 1], [1, 2]]));
    let out = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap();
    assert_eq!(assigned(&out, "var"), Some("fisher.test"));
    let p = label_p(&out, "var").unwrap();
    assert!((p - 1.0).abs() < 1e-9, "p = {p}");
}

#[test]
fn adequate_expected_counts_default_to_chi_squared() {
    let table = summary(from_counts(&[[50, 40], [45, 55]]));
    let out = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap();
    assert_eq!(assigned(&out, "var"), Some("chisq.test.no.correct"));
    let p = label_p(&out, "var").unwrap();
    assert!((p - 0.146_233).abs() < 1e-4, "p = {p}");
}

#[test]
fn continuous_default_and_single_override() {
    let table = summary(from_counts(&[[50, 40], [45, 55]]));
    let defaults = add_p(&table, &AddPOptions::new(), &sequential()).unwrap();
    assert_eq!(assigned(&defaults, "age"), Some("wilcox.test"));

    let options = AddPOptions::new().test(Selector::names(&["age"]), "t.test");
    let out = add_p(&table, &options, &sequential()).unwrap();
    assert_eq!(assigned(&out, "age"), Some("t.test"));
    assert_eq!(assigned(&out, "var"), assigned(&defaults, "var"));
    assert_eq!(label_p(&out, "var"), label_p(&defaults, "var"));
}

#[test]
fn merge_only_touches_pvalue_column() {
    let table = summary(from_counts(&[[10, 12], [9, 7], [4, 6]]));
    let out = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap();
    let before = &table.core().body;
    let after = out.core().body.drop(PVALUE_COLUMN).unwrap();
    assert!(before.equals_missing(&after));
    assert_eq!(out.core().body.width(), before.width() + 1);
}

#[test]
fn custom_test_result_is_used_verbatim() {
    let custom = CustomTest::new("my_test", |input| {
        assert_eq!(input.by, "trt");
        match json!({"p": 0.123, "test": "My test"}) {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err("not an object".into()),
        }
    });
    let table = summary(from_counts(&[[5, 6], [7, 8]]));
    let options = AddPOptions::new().test(Selector::names(&["var"]), custom);
    let out = add_p(&table, &options, &TabConfig::default()).unwrap();
    assert_eq!(label_p(&out, "var"), Some(0.123));
    assert_eq!(assigned(&out, "var"), Some("my_test"));
    assert!(footnote(&out).unwrap().contains("My test"));
}

#[test]
fn custom_test_contract_is_enforced() {
    let custom = CustomTest::new("bad", |_| {
        let mut map = serde_json::Map::new();
        map.insert("p".to_string(), json!("0.5"));
        Ok(map)
    });
    let table = summary(from_counts(&[[5, 6], [7, 8]]));
    let options = AddPOptions::new().test(Selector::names(&["var"]), custom);
    let err = add_p(&table, &options, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::ContractViolation { ref variable, .. } if variable == "var"));
}

#[test]
fn table_without_by_is_rejected() {
    let table = tbl_summary(from_counts(&[[5, 6], [7, 8]]), &SummaryOptions::default()).unwrap();
    let err = add_p(&table, &AddPOptions::new(), &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::MissingBy));
    assert!(err.is_configuration());
    assert!(table.core().body.column(PVALUE_COLUMN).is_err());
}

#[test]
fn excluded_variables_have_no_pvalue_or_footnote() {
    let table = summary(from_counts(&[[2, 1], [1, 2]]));
    let options = AddPOptions::new().include(Selector::parse("-var").unwrap());
    let out = add_p(&table, &options, &TabConfig::default()).unwrap();
    let meta = out.core().meta_for("var").unwrap();
    assert_eq!(meta.test, None);
    assert_eq!(meta.result.as_ref().and_then(|r| r.p_value), None);
    assert_eq!(label_p(&out, "var"), None);
    assert_eq!(footnote(&out).as_deref(), Some("Wilcoxon rank sum test"));

    let legacy = AddPOptions::new().exclude(Selector::names(&["var"]));
    let out = add_p(&table, &legacy, &TabConfig::default()).unwrap();
    assert_eq!(label_p(&out, "var"), None);
    assert!(!footnote(&out).unwrap().contains("Fisher"));
}

#[test]
fn header_and_audit_record() {
    let table = summary(from_counts(&[[2, 1], [1, 2]]));
    let options = AddPOptions::new().pvalue_fun(PvalueFormatter::style(3).unwrap());
    let out = add_p(&table, &options, &TabConfig::default()).unwrap();
    let header = out.core().header_for(PVALUE_COLUMN).unwrap();
    assert_eq!(header.label, "**p-value**");
    assert!(!header.hide);
    assert_eq!(
        header.formatter.as_ref().map(PvalueFormatter::name),
        Some("style_pvalue(digits = 3)")
    );
    insta::assert_snapshot!(
        header.footnote.clone().unwrap(),
        @"Fisher's exact test; Wilcoxon rank sum test"
    );

    let calls = &out.core().calls;
    assert_eq!(calls.len(), table.core().calls.len() + 1);
    let last = calls.last().unwrap();
    assert_eq!(last.function, "add_p");
    assert_eq!(
        last.arguments,
        vec![("pvalue_fun".to_string(), "style_pvalue(digits = 3)".to_string())]
    );
}

#[test]
fn failing_test_aborts_or_is_isolated() {
    let failing = CustomTest::new("boom", |_| Err("numerical failure".into()));
    let table = summary(from_counts(&[[5, 6], [7, 8]]));
    let options = AddPOptions::new().test(Selector::names(&["var"]), failing);

    let err = add_p(&table, &options, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::Execution { .. }));
    assert!(!err.is_configuration());

    let isolate = TabConfig {
        on_error: OnError::Isolate,
        ..TabConfig::default()
    };
    let out = add_p(&table, &options, &isolate).unwrap();
    assert_eq!(label_p(&out, "var"), None);
    assert!(label_p(&out, "age").is_some());
}

#[test]
fn unknown_test_fails_before_execution() {
    let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = ran.clone();
    let spy = CustomTest::new("spy", move |_| {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(serde_json::Map::new())
    });
    let table = summary(from_counts(&[[5, 6], [7, 8]]));
    let options = AddPOptions::new()
        .test(Selector::names(&["var"]), spy)
        .test(Selector::names(&["age"]), "svy.t.test");
    let err = add_p(&table, &options, &TabConfig::default()).unwrap_err();
    assert!(matches!(err, AddPError::UnknownTest { ref test, .. } if test == "svy.t.test"));
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
}

#[test]
fn paired_tests_use_the_group_as_pairing_id() {
    let df = DataFrame::new(vec![
        Column::new("id".into(), vec!["1", "2", "3", "4", "5", "1", "2", "3", "4", "5"]),
        Column::new(
            "visit".into(),
            vec!["pre", "pre", "pre", "pre", "pre", "post", "post", "post", "post", "post"],
        ),
        Column::new(
            "score".into(),
            vec![10.0, 12.0, 9.0, 14.0, 11.0, 12.5, 13.0, 11.0, 15.5, 12.0],
        ),
    ])
    .unwrap();
    let table = tbl_summary(
        df,
        &SummaryOptions::default()
            .by("visit")
            .include(&["score"])
            .summary_type("score", SummaryType::Continuous),
    )
    .unwrap();
    let options = AddPOptions::new()
        .group("id")
        .test(Selector::names(&["score"]), "paired.t.test");
    let out = add_p(&table, &options, &TabConfig::default()).unwrap();
    // differences 2.5, 1, 2, 1.5, 1: t = 5.488 on 4 df
    let p = label_p(&out, "score").unwrap();
    assert!((p - 0.005_370).abs() < 1e-4, "p = {p}");
    assert_eq!(footnote(&out).as_deref(), Some("Paired t-test"));
}

#[test]
fn group_selects_random_intercept_default() {
    let df = DataFrame::new(vec![
        Column::new("id".into(), vec!["1", "1", "2", "2", "3", "3", "4", "4"]),
        Column::new("arm".into(), vec!["A", "B", "A", "B", "A", "B", "A", "B"]),
        Column::new("sex".into(), vec!["F", "M", "F", "F", "M", "M", "F", "M"]),
    ])
    .unwrap();
    let table = tbl_summary(df, &SummaryOptions::default().by("arm").include(&["sex"])).unwrap();
    let config = TabConfig {
        on_error: OnError::Isolate,
        ..sequential()
    };
    let out = add_p(&table, &AddPOptions::new().group("id"), &config).unwrap();
    assert_eq!(assigned(&out, "sex"), Some("lme4"));

    let err = add_p(&table, &AddPOptions::new().group("arm"), &config).unwrap_err();
    assert!(matches!(err, AddPError::InvalidArgument { argument: "group", .. }));
    let err = add_p(&table, &AddPOptions::new().group("nope"), &config).unwrap_err();
    assert!(matches!(err, AddPError::InvalidArgument { argument: "group", .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn expected_count_rule(a in 1usize..25, b in 1usize..25, c in 1usize..25, d in 1usize..25) {
        let table = summary(from_counts(&[[a, b], [c, d]]));
        let out = add_p(&table, &AddPOptions::new(), &sequential()).unwrap();
        let (r1, r2, c1, c2) = ((a + b) as f64, (c + d) as f64, (a + c) as f64, (b + d) as f64);
        let n = r1 + r2;
        let min_expected = [r1 * c1, r1 * c2, r2 * c1, r2 * c2]
            .into_iter()
            .fold(f64::INFINITY, f64::min)
            / n;
        let expected = if min_expected < 5.0 { "fisher.test" } else { "chisq.test.no.correct" };
        prop_assert_eq!(assigned(&out, "var"), Some(expected));

        let after = out.core().body.drop(PVALUE_COLUMN).unwrap();
        prop_assert!(table.core().body.equals_missing(&after));
    }
    #[test]
    fn merge_leaves_other_columns_alone(
        counts in prop::collection::vec([1usize..15, 1usize..15], 2..5),
    ) {
        let table = summary(from_counts(&counts));
        let out = add_p(&table, &AddPOptions::new(), &sequential()).unwrap();

        let after = out.core().body.drop(PVALUE_COLUMN).unwrap();
        prop_assert!(table.core().body.equals_missing(&after));
        let other_headers = |t: &GtTable| -> Vec<String> {
            t.core()
                .header
                .iter()
                .filter(|h| h.column != PVALUE_COLUMN)
                .map(|h| format!("{h:?}"))
                .collect()
        };
        prop_assert_eq!(other_headers(&table), other_headers(&out));
    }

    #[test]
    fn override_changes_only_its_variable(
        test in prop::sample::select(vec!["t.test", "aov", "kruskal.test", "wilcox.test"]),
        a in 3usize..20,
        b in 3usize..20,
    ) {
        let table = summary(from_counts(&[[a, b], [b, a]]));
        let defaults = add_p(&table, &AddPOptions::new(), &sequential()).unwrap();
        let options = AddPOptions::new().test(Selector::names(&["age"]), test);
        let out = add_p(&table, &options, &sequential()).unwrap();

        prop_assert_eq!(assigned(&out, "age"), Some(test));
        prop_assert_eq!(assigned(&out, "var"), assigned(&defaults, "var"));
        prop_assert_eq!(label_p(&out, "var"), label_p(&defaults, "var"));
    }
}
