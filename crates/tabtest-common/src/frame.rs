//! Polars `AnyValue` and column helpers.
//!
//! Tests only ever see plain vectors: continuous values as `Option<f64>`,
//! categorical values as `Option<String>`. Everything that touches Polars
//! types directly lives here.

use polars::prelude::{AnyValue, DataFrame, DataType, PolarsResult};

/// Converts a Polars `AnyValue` to a `String` representation.
///
/// Returns an empty string for `Null`, formats numeric types without
/// unnecessary trailing zeros, and renders booleans as `TRUE`/`FALSE`.
///
/// # Examples
///
/// ```
/// use polars::prelude::AnyValue;
/// use tabtest_common::any_to_string;
///
/// assert_eq!(any_to_string(AnyValue::Null), "");
/// assert_eq!(any_to_string(AnyValue::Int32(42)), "42");
/// assert_eq!(any_to_string(AnyValue::String("hello")), "hello");
/// ```
pub fn any_to_string(value: AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::Int8(v) => v.to_string(),
        AnyValue::Int16(v) => v.to_string(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::UInt8(v) => v.to_string(),
        AnyValue::UInt16(v) => v.to_string(),
        AnyValue::UInt32(v) => v.to_string(),
        AnyValue::UInt64(v) => v.to_string(),
        AnyValue::Float32(v) => format_numeric(f64::from(v)),
        AnyValue::Float64(v) => format_numeric(v),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
        other => other.to_string(),
    }
}

/// Converts `AnyValue` to `String`, returning `None` if the result is empty.
pub fn any_to_string_non_empty(value: AnyValue<'_>) -> Option<String> {
    let s = any_to_string(value);
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Formats a floating-point number as a string without trailing zeros.
///
/// # Examples
///
/// ```
/// use tabtest_common::format_numeric;
///
/// assert_eq!(format_numeric(1.0), "1");
/// assert_eq!(format_numeric(1.50), "1.5");
/// assert_eq!(format_numeric(0.0), "0");
/// ```
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Converts an `AnyValue` to `f64`, returning `None` for non-numeric or null values.
///
/// Handles integer types, floating-point types, booleans (as 0/1) and
/// string parsing. `NaN` is treated as missing.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    let v = match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(v)),
        AnyValue::Int16(v) => Some(f64::from(v)),
        AnyValue::Int32(v) => Some(f64::from(v)),
        AnyValue::Int64(v) => Some(v as f64),
        AnyValue::UInt8(v) => Some(f64::from(v)),
        AnyValue::UInt16(v) => Some(f64::from(v)),
        AnyValue::UInt32(v) => Some(f64::from(v)),
        AnyValue::UInt64(v) => Some(v as f64),
        AnyValue::Float32(v) => Some(f64::from(v)),
        AnyValue::Float64(v) => Some(v),
        AnyValue::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
        AnyValue::String(s) => parse_f64(s),
        AnyValue::StringOwned(s) => parse_f64(s.as_str()),
        _ => None,
    };
    v.filter(|x| !x.is_nan())
}

/// Parses a string as `f64`, returning `None` for invalid or empty strings.
pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Returns true when a value counts as missing: null, blank text or `NaN`.
pub fn is_missing_value(value: &AnyValue<'_>) -> bool {
    match value {
        AnyValue::Null => true,
        AnyValue::String(s) => s.trim().is_empty(),
        AnyValue::StringOwned(s) => s.trim().is_empty(),
        AnyValue::Float32(v) => v.is_nan(),
        AnyValue::Float64(v) => v.is_nan(),
        _ => false,
    }
}

/// Returns true for the integer and floating-point dtypes.
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Extracts a column as numbers. Missing and non-numeric cells become `None`.
pub fn column_f64(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let mut out = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let value = column.get(idx)?;
        out.push(if is_missing_value(&value) {
            None
        } else {
            any_to_f64(value)
        });
    }
    Ok(out)
}

/// Extracts a column as text. Missing cells become `None`.
pub fn column_strings(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?;
    let mut out = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let value = column.get(idx)?;
        out.push(if is_missing_value(&value) {
            None
        } else {
            any_to_string_non_empty(value)
        });
    }
    Ok(out)
}

/// Distinct non-missing levels in display order.
///
/// Levels sort numerically when every level parses as a number, otherwise
/// lexicographically.
pub fn sorted_levels(values: &[Option<String>]) -> Vec<String> {
    let mut levels: Vec<String> = values.iter().flatten().cloned().collect();
    levels.sort();
    levels.dedup();
    if levels.iter().all(|l| parse_f64(l).is_some()) {
        levels.sort_by(|a, b| {
            let x = parse_f64(a).unwrap_or(f64::NAN);
            let y = parse_f64(b).unwrap_or(f64::NAN);
            x.total_cmp(&y)
        });
    }
    levels
}
