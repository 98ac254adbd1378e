//! P-value display formatting.

use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, Result};

type FormatFn = dyn Fn(f64) -> String + Send + Sync;

/// A named `number -> string` formatting function for the p-value column.
#[derive(Clone)]
pub struct PvalueFormatter {
    name: String,
    func: Arc<FormatFn>,
}

impl fmt::Debug for PvalueFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PvalueFormatter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PvalueFormatter {
    /// Wrap an arbitrary function.
    pub fn custom(
        name: impl Into<String>,
        func: impl Fn(f64) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Standard p-value style with 1 to 3 significant decimal places.
    pub fn style(digits: u8) -> Result<Self> {
        if !(1..=3).contains(&digits) {
            return Err(ModelError::InvalidArgument {
                argument: "pvalue_fun",
                reason: format!("digits must be 1, 2 or 3, got {digits}"),
            });
        }
        Ok(Self::custom(format!("style_pvalue(digits = {digits})"), move |p| {
            style_pvalue(p, digits)
        }))
    }

    /// Same as [`PvalueFormatter::style`] with a leading `p=` / `p<` / `p>`.
    pub fn style_prepend_p(digits: u8) -> Result<Self> {
        let base = Self::style(digits)?;
        Ok(Self::custom(
            format!("style_pvalue(digits = {digits}, prepend_p = TRUE)"),
            move |p| prepend_p(&base.format(p)),
        ))
    }

    /// Look a formatter up by name: `style_pvalue`, `style_pvalue_p`,
    /// `label_style_pvalue` or `raw`.
    pub fn named(name: &str, digits: u8) -> Result<Self> {
        match name {
            "style_pvalue" | "label_style_pvalue" => Self::style(digits),
            "style_pvalue_p" => Self::style_prepend_p(digits),
            "raw" => Ok(Self::custom("raw", |p| p.to_string())),
            other => Err(ModelError::InvalidArgument {
                argument: "pvalue_fun",
                reason: format!("unknown formatter `{other}`"),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format a p-value. Missing values render as an empty string.
    pub fn format(&self, p: f64) -> String {
        if p.is_nan() {
            return String::new();
        }
        (self.func)(p)
    }
}

fn fixed(p: f64, decimals: usize) -> String {
    format!("{p:.decimals$}")
}

/// The standard p-value rules: large values are truncated at the top,
/// small values collapse to `<0.001`, everything in between keeps enough
/// decimals to be distinguishable.
pub fn style_pvalue(p: f64, digits: u8) -> String {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return String::new();
    }
    match digits {
        1 => {
            if p > 0.9 {
                ">0.9".to_string()
            } else if p >= 0.2 {
                fixed(p, 1)
            } else if p >= 0.1 {
                fixed(p, 2)
            } else if p >= 0.001 {
                fixed(p, 3)
            } else {
                "<0.001".to_string()
            }
        }
        2 => {
            if p > 0.99 {
                ">0.99".to_string()
            } else if p >= 0.1 {
                fixed(p, 2)
            } else if p >= 0.001 {
                fixed(p, 3)
            } else {
                "<0.001".to_string()
            }
        }
        _ => {
            if p > 0.999 {
                ">0.999".to_string()
            } else if p >= 0.001 {
                fixed(p, 3)
            } else {
                "<0.001".to_string()
            }
        }
    }
}

fn prepend_p(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else if text.starts_with('<') || text.starts_with('>') {
        format!("p{text}")
    } else {
        format!("p={text}")
    }
}
