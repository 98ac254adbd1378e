//! Shared utilities for the tabtest crates.
//!
//! This crate provides the Polars helpers every other crate leans on:
//! `AnyValue` conversions, the missing-value rule, and whole-column
//! extraction into plain Rust vectors.

pub mod frame;

pub use frame::{
    any_to_f64, any_to_string, any_to_string_non_empty, column_f64, column_strings,
    format_numeric, is_missing_value, is_numeric_dtype, parse_f64, sorted_levels,
};
