use anyhow::{Context, Result};
use tabtest_core::{add_p, AddPOptions};
use tabtest_model::{GtTable, PvalueFormatter, Selector, TabConfig, TableKind};
use tracing::{debug, info_span};

use tabtest_cli::input::{
    build_table, parse_test, parse_test_arg, parse_type, read_csv, TableRequest,
};
use tabtest_cli::summary::registry_table;

use crate::cli::{AddPArgs, TestsArgs};

pub fn run_tests(args: &TestsArgs) -> Result<()> {
    println!("{}", registry_table(args.kind.map(TableKind::from)));
    Ok(())
}

fn load_config(args: &AddPArgs) -> Result<TabConfig> {
    match &args.config {
        Some(path) => {
            TabConfig::from_path(path).with_context(|| format!("load config {}", path.display()))
        }
        None => Ok(TabConfig::default()),
    }
}

fn table_request(args: &AddPArgs) -> Result<TableRequest> {
    let mut request = TableRequest::new(args.kind.into());
    request.by = args.by.clone();
    request.row = args.row.clone();
    request.variables = args.variables.clone();
    request.types = args
        .types
        .iter()
        .map(|t| parse_type(t))
        .collect::<Result<_>>()?;
    request.weights = args.weights.clone();
    request.strata = args.strata.clone();
    request.cluster = args.cluster.clone();
    request.time = args.time.clone();
    request.status = args.status.clone();
    Ok(request)
}

fn add_p_options(args: &AddPArgs, config: &TabConfig) -> Result<AddPOptions> {
    let mut options = AddPOptions::new()
        .source_note(args.source_note)
        .quiet(args.quiet);
    for text in &args.tests {
        let (selector, test) = parse_test(text)?;
        options = options.test(selector, test.as_str());
    }
    for text in &args.test_args {
        let (selector, test_args) = parse_test_arg(text)?;
        options = options.test_args(selector, test_args);
    }
    if let Some(group) = &args.group {
        options = options.group(group.clone());
    }
    if let Some(include) = &args.include {
        options = options.include(Selector::parse(include).context("--include")?);
    }
    if let Some(exclude) = &args.exclude {
        options = options.exclude(Selector::parse(exclude).context("--exclude")?);
    }
    if let Some(name) = &args.pvalue_fun {
        let formatter =
            PvalueFormatter::named(name, config.pvalue.digits).context("--pvalue-fun")?;
        options = options.pvalue_fun(formatter);
    }
    Ok(options)
}

pub fn run_add_p(args: &AddPArgs) -> Result<GtTable> {
    let span = info_span!("add-p", input = %args.input.display());
    let _guard = span.enter();

    let config = load_config(args)?;
    let data = read_csv(&args.input)?;
    debug!(rows = data.height(), columns = data.width(), "loaded data");
    let table = build_table(data, &table_request(args)?)?;
    let options = add_p_options(args, &config)?;
    add_p(&table, &options, &config).context("add p-values")
}
