//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;
use tabtest_model::TableKind;

#[derive(Parser)]
#[command(
    name = "tabtest",
    version,
    about = "Add hypothesis-test p-values to summary tables",
    long_about = "Build a summary, cross, survey or survival table from a CSV file and \n\
                  add one p-value per variable, choosing the test from the data or \n\
                  from explicit overrides."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format.
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a table from a CSV file and add p-values.
    AddP(AddPArgs),

    /// List the built-in tests of each table kind.
    Tests(TestsArgs),
}

#[derive(Parser)]
pub struct AddPArgs {
    /// CSV file with one row per observation.
    #[arg(value_name = "CSV")]
    pub input: PathBuf,

    /// Kind of table to build.
    #[arg(long = "kind", value_enum, default_value = "summary")]
    pub kind: KindArg,

    /// Comparison variable. For survival tables: the stratifying variables.
    #[arg(long = "by", value_name = "VAR", value_delimiter = ',')]
    pub by: Vec<String>,

    /// Row variable of a cross table.
    #[arg(long = "row", value_name = "VAR")]
    pub row: Option<String>,

    /// Columns to summarise (default: every other column).
    #[arg(long = "variables", value_name = "VAR", value_delimiter = ',')]
    pub variables: Vec<String>,

    /// Summary type of a variable, e.g. `age=continuous`.
    #[arg(long = "type", value_name = "VAR=TYPE")]
    pub types: Vec<String>,

    /// Variables that receive a test, as a selector expression.
    #[arg(long = "include", value_name = "SELECTOR")]
    pub include: Option<String>,

    /// Deprecated: variables that receive no test.
    #[arg(long = "exclude", value_name = "SELECTOR")]
    pub exclude: Option<String>,

    /// Test override, e.g. `all_continuous()=t.test`. Later entries win.
    #[arg(long = "test", value_name = "SELECTOR=TEST")]
    pub tests: Vec<String>,

    /// Extra test argument, e.g. `age:var_equal=TRUE`.
    #[arg(long = "test-arg", value_name = "SELECTOR:NAME=VALUE")]
    pub test_args: Vec<String>,

    /// Correlation group for paired and clustered tests.
    #[arg(long = "group", value_name = "VAR")]
    pub group: Option<String>,

    /// Survey weights column.
    #[arg(long = "weights", value_name = "VAR")]
    pub weights: Option<String>,

    /// Survey strata column.
    #[arg(long = "strata", value_name = "VAR")]
    pub strata: Option<String>,

    /// Survey cluster (PSU) column.
    #[arg(long = "cluster", value_name = "VAR")]
    pub cluster: Option<String>,

    /// Survival time column.
    #[arg(long = "time", value_name = "VAR")]
    pub time: Option<String>,

    /// Survival event column (1 = event, 0 = censored).
    #[arg(long = "status", value_name = "VAR")]
    pub status: Option<String>,

    /// P-value formatter: style_pvalue, style_pvalue_p or raw.
    #[arg(long = "pvalue-fun", value_name = "NAME")]
    pub pvalue_fun: Option<String>,

    /// Cross tables: report the test in a source note.
    #[arg(long = "source-note")]
    pub source_note: bool,

    /// Survival tables: do not log the model call.
    #[arg(long = "quiet")]
    pub quiet: bool,

    /// TOML configuration file.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
pub struct TestsArgs {
    /// Only list tests for this table kind.
    #[arg(long = "kind", value_enum)]
    pub kind: Option<KindArg>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Summary,
    Cross,
    Survey,
    Survival,
}

impl From<KindArg> for TableKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Summary => Self::Summary,
            KindArg::Cross => Self::Cross,
            KindArg::Survey => Self::Survey,
            KindArg::Survival => Self::Survival,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
