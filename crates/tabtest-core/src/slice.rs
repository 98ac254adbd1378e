//! Extract the vectors a test needs from the table's data.
//!
//! Continuous and categorical slices keep only observations where both the
//! variable and `by` are present. Levels of `by` come from the whole
//! column so that an empty group is still visible to the test.

use std::collections::BTreeMap;

use polars::prelude::{DataFrame, PolarsResult};
use tabtest_common::{column_f64, column_strings, sorted_levels};
use tabtest_model::DesignSpec;
use tabtest_stats::{ContingencyTable, StatsError, SurveyDesign};

use crate::error::TestFailure;

/// Distinct non-missing values of `column`, in display order.
pub(crate) fn levels(df: &DataFrame, column: &str) -> PolarsResult<Vec<String>> {
    Ok(sorted_levels(&column_strings(df, column)?))
}

fn code(levels: &[String], value: Option<&String>) -> Option<usize> {
    value.and_then(|v| levels.iter().position(|l| l == v))
}

/// A continuous variable split by the levels of `by`.
#[derive(Debug, Clone)]
pub(crate) struct ContinuousSlice {
    pub groups: Vec<Vec<f64>>,
}

impl ContinuousSlice {
    pub fn new(df: &DataFrame, variable: &str, by: &str) -> PolarsResult<Self> {
        let by_levels = levels(df, by)?;
        let by_values = column_strings(df, by)?;
        let values = column_f64(df, variable)?;
        let mut groups = vec![Vec::new(); by_levels.len()];
        for (value, group) in values.iter().zip(&by_values) {
            if let (Some(v), Some(g)) = (value, code(&by_levels, group.as_ref())) {
                groups[g].push(*v);
            }
        }
        Ok(Self { groups })
    }

    /// The two samples of a two-level comparison.
    pub fn two(&self, test: &'static str) -> Result<(&[f64], &[f64]), TestFailure> {
        match self.groups.as_slice() {
            [x, y] => Ok((x, y)),
            other => Err(StatsError::GroupCount {
                test,
                expected: "exactly 2".to_string(),
                found: other.len(),
            }
            .into()),
        }
    }
}

/// A categorical variable cross-classified against `by`.
#[derive(Debug, Clone)]
pub(crate) struct CategoricalSlice {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub row_levels: Vec<String>,
    pub col_levels: Vec<String>,
}

impl CategoricalSlice {
    pub fn new(df: &DataFrame, variable: &str, by: &str) -> PolarsResult<Self> {
        let var_values = column_strings(df, variable)?;
        let by_values = column_strings(df, by)?;
        let complete: Vec<(&String, &String)> = var_values
            .iter()
            .zip(&by_values)
            .filter_map(|(v, b)| Some((v.as_ref()?, b.as_ref()?)))
            .collect();
        let row_levels =
            sorted_levels(&complete.iter().map(|(v, _)| Some((*v).clone())).collect::<Vec<_>>());
        let col_levels =
            sorted_levels(&complete.iter().map(|(_, b)| Some((*b).clone())).collect::<Vec<_>>());
        let mut rows = Vec::with_capacity(complete.len());
        let mut cols = Vec::with_capacity(complete.len());
        for (v, b) in complete {
            if let (Some(r), Some(c)) = (code(&row_levels, Some(v)), code(&col_levels, Some(b))) {
                rows.push(r);
                cols.push(c);
            }
        }
        Ok(Self {
            rows,
            cols,
            row_levels,
            col_levels,
        })
    }

    pub fn table(&self) -> Result<ContingencyTable, StatsError> {
        ContingencyTable::tabulate(
            &self.rows,
            &self.cols,
            self.row_levels.len(),
            self.col_levels.len(),
        )
    }
}

/// Values of `variable` for each correlation group at the two levels of
/// `by`, keeping groups observed at both.
#[derive(Debug, Clone)]
pub(crate) struct PairedSlice {
    pub first: Vec<String>,
    pub second: Vec<String>,
}

impl PairedSlice {
    pub fn new(
        df: &DataFrame,
        variable: &str,
        by: &str,
        group: &str,
        test: &'static str,
    ) -> Result<Self, TestFailure> {
        let by_levels = levels(df, by)?;
        if by_levels.len() != 2 {
            return Err(StatsError::GroupCount {
                test,
                expected: "exactly 2".to_string(),
                found: by_levels.len(),
            }
            .into());
        }
        let values = column_strings(df, variable)?;
        let by_values = column_strings(df, by)?;
        let ids = column_strings(df, group)?;

        let mut pairs: BTreeMap<String, [Option<String>; 2]> = BTreeMap::new();
        for ((value, b), id) in values.into_iter().zip(&by_values).zip(ids) {
            let (Some(slot), Some(id)) = (code(&by_levels, b.as_ref()), id) else {
                continue;
            };
            let entry = pairs.entry(id.clone()).or_insert([None, None]);
            if value.is_some() && entry[slot].is_some() {
                return Err(TestFailure::Data(format!(
                    "`{group}` value `{id}` appears more than once at `{by}` level `{}`",
                    by_levels[slot]
                )));
            }
            if value.is_some() {
                entry[slot] = value;
            }
        }

        let (first, second) = pairs
            .into_values()
            .filter_map(|[a, b]| Some((a?, b?)))
            .unzip();
        Ok(Self { first, second })
    }

    pub fn numeric(&self, test: &'static str) -> Result<(Vec<f64>, Vec<f64>), TestFailure> {
        let parse = |values: &[String]| -> Result<Vec<f64>, TestFailure> {
            values
                .iter()
                .map(|v| {
                    v.trim().parse::<f64>().map_err(|_| {
                        TestFailure::Data(format!("{test}: non-numeric value `{v}`"))
                    })
                })
                .collect()
        };
        Ok((parse(&self.first)?, parse(&self.second)?))
    }

    /// Square table of paired outcomes over the union of observed levels.
    pub fn square_table(&self) -> Vec<Vec<f64>> {
        let all: Vec<Option<String>> = self
            .first
            .iter()
            .chain(&self.second)
            .map(|v| Some(v.clone()))
            .collect();
        let levels = sorted_levels(&all);
        let k = levels.len();
        let mut table = vec![vec![0.0; k]; k];
        for (a, b) in self.first.iter().zip(&self.second) {
            if let (Some(i), Some(j)) = (code(&levels, Some(a)), code(&levels, Some(b))) {
                table[i][j] += 1.0;
            }
        }
        table
    }
}

/// Outcome, covariate rows and cluster codes for the random-intercept
/// model: `by` (two levels, second level = 1) on `variable` within `group`.
pub(crate) struct ClusteredSlice {
    pub outcome: Vec<f64>,
    pub covariates: Vec<Vec<f64>>,
    pub clusters: Vec<usize>,
}

impl ClusteredSlice {
    pub fn new(
        df: &DataFrame,
        variable: &str,
        continuous: bool,
        by: &str,
        group: &str,
    ) -> Result<Self, TestFailure> {
        let by_values = column_strings(df, by)?;
        let ids = column_strings(df, group)?;
        let text = column_strings(df, variable)?;
        let numbers = column_f64(df, variable)?;

        let keep: Vec<usize> = (0..df.height())
            .filter(|&i| {
                by_values[i].is_some()
                    && ids[i].is_some()
                    && if continuous {
                        numbers[i].is_some()
                    } else {
                        text[i].is_some()
                    }
            })
            .collect();

        let by_levels = sorted_levels(&keep.iter().map(|&i| by_values[i].clone()).collect::<Vec<_>>());
        if by_levels.len() != 2 {
            return Err(StatsError::GroupCount {
                test: "lme4",
                expected: "exactly 2".to_string(),
                found: by_levels.len(),
            }
            .into());
        }
        let var_levels = sorted_levels(&keep.iter().map(|&i| text[i].clone()).collect::<Vec<_>>());
        let id_levels = sorted_levels(&keep.iter().map(|&i| ids[i].clone()).collect::<Vec<_>>());

        let mut outcome = Vec::with_capacity(keep.len());
        let mut covariates = Vec::with_capacity(keep.len());
        let mut clusters = Vec::with_capacity(keep.len());
        for i in keep {
            let is_second = by_values[i].as_ref() == Some(&by_levels[1]);
            outcome.push(if is_second { 1.0 } else { 0.0 });
            if continuous {
                covariates.push(vec![numbers[i].unwrap_or(f64::NAN)]);
            } else {
                let level = code(&var_levels, text[i].as_ref()).unwrap_or(0);
                covariates.push(
                    (1..var_levels.len())
                        .map(|l| if l == level { 1.0 } else { 0.0 })
                        .collect(),
                );
            }
            clusters.push(code(&id_levels, ids[i].as_ref()).unwrap_or(0));
        }
        Ok(Self {
            outcome,
            covariates,
            clusters,
        })
    }
}

fn codes_of(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<usize>>> {
    let values = column_strings(df, column)?;
    let levels = sorted_levels(&values);
    Ok(values.iter().map(|v| code(&levels, v.as_ref())).collect())
}

/// Statistics-side design for a survey table. Rows with a missing stratum
/// or cluster id form their own stratum or cluster.
pub(crate) fn survey_design(spec: &DesignSpec) -> Result<SurveyDesign, TestFailure> {
    let df = &spec.data;
    let weights = column_f64(df, &spec.weights)?
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            w.ok_or_else(|| {
                TestFailure::Data(format!("missing weight `{}` in row {}", spec.weights, i + 1))
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let codes = |column: &Option<String>| -> PolarsResult<Option<Vec<usize>>> {
        column
            .as_deref()
            .map(|c| -> PolarsResult<Vec<usize>> {
                let codes = codes_of(df, c)?;
                let missing = codes.iter().flatten().max().map_or(0, |m| m + 1);
                Ok(codes.into_iter().map(|c| c.unwrap_or(missing)).collect())
            })
            .transpose()
    };
    Ok(SurveyDesign::new(
        weights,
        codes(&spec.strata)?,
        codes(&spec.cluster)?,
    )?)
}

/// A survey variable and `by` codes over every row of the design, with
/// incomplete rows zero-weighted so the design degrees of freedom are kept.
pub(crate) struct SurveySlice {
    pub values: Vec<f64>,
    /// Codes of a categorical variable; empty for continuous slices.
    pub codes: Vec<usize>,
    pub groups: Vec<usize>,
    pub design: SurveyDesign,
}

impl SurveySlice {
    pub fn new(
        df: &DataFrame,
        variable: &str,
        continuous: bool,
        by: &str,
        base: &SurveyDesign,
    ) -> PolarsResult<Self> {
        let groups = codes_of(df, by)?;
        let (values, codes, present): (Vec<f64>, Vec<usize>, Vec<bool>) = if continuous {
            let values = column_f64(df, variable)?;
            let present = values.iter().map(Option::is_some).collect();
            (
                values.into_iter().map(|v| v.unwrap_or(0.0)).collect(),
                Vec::new(),
                present,
            )
        } else {
            let codes = codes_of(df, variable)?;
            let present = codes.iter().map(Option::is_some).collect();
            (
                Vec::new(),
                codes.into_iter().map(|c| c.unwrap_or(0)).collect(),
                present,
            )
        };
        let keep: Vec<bool> = present
            .iter()
            .zip(&groups)
            .map(|(p, g)| *p && g.is_some())
            .collect();
        Ok(Self {
            values,
            codes,
            groups: groups.into_iter().map(|g| g.unwrap_or(0)).collect(),
            design: base.subset(&keep),
        })
    }
}
