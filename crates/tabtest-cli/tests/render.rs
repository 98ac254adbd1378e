use std::io::Write;

use tabtest_cli::input::{build_table, parse_test, read_csv, TableRequest};
use tabtest_cli::summary::{notes, registry_table, render_table};
use tabtest_core::{add_p, AddPOptions};
use tabtest_model::{TabConfig, TableKind};
use tempfile::NamedTempFile;

fn csv_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "arm,age,stage").unwrap();
    let stages = ["T1", "T2"];
    for i in 0..24 {
        let arm = if i % 2 == 0 { "Drug" } else { "Placebo" };
        let age = 30 + (i * 7) % 31;
        writeln!(file, "{arm},{age},{}", stages[(i / 3) % 2]).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn summary_table_from_csv() {
    let file = csv_file();
    let data = read_csv(file.path()).unwrap();
    assert_eq!(data.height(), 24);

    let mut request = TableRequest::new(TableKind::Summary);
    request.by = vec!["arm".to_string()];
    let table = build_table(data, &request).unwrap();
    let (selector, test) = parse_test("age=t.test").unwrap();
    let options = AddPOptions::new().test(selector, test.as_str());
    let out = add_p(&table, &options, &TabConfig::default()).unwrap();

    let rendered = render_table(&out).to_string();
    assert!(rendered.contains("p-value"));
    assert!(rendered.contains("Characteristic"));
    let lines = notes(&out);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with('¹'));
    assert!(lines[0].contains("Welch Two Sample t-test"));
}

#[test]
fn cross_table_source_note() {
    let file = csv_file();
    let data = read_csv(file.path()).unwrap();
    let mut request = TableRequest::new(TableKind::Cross);
    request.by = vec!["arm".to_string()];
    request.row = Some("stage".to_string());
    let table = build_table(data, &request).unwrap();
    let out = add_p(
        &table,
        &AddPOptions::new().source_note(true),
        &TabConfig::default(),
    )
    .unwrap();

    let rendered = render_table(&out).to_string();
    assert!(!rendered.contains("p-value"));
    insta::assert_debug_snapshot!(notes(&out), @r#"
    [
        "Pearson's Chi-squared test, p=0.10",
    ]
    "#);
}

#[test]
fn registry_listing_per_kind() {
    let listing = registry_table(Some(TableKind::Survival)).to_string();
    for id in ["logrank", "survdiff", "coxph_score"] {
        assert!(listing.contains(id), "{id} missing");
    }
    assert!(!listing.contains("t.test"));
}
