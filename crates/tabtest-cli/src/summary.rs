//! Terminal rendering of augmented tables.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use polars::prelude::{AnyValue, DataFrame};
use tabtest_common::{any_to_f64, any_to_string};
use tabtest_core::{registry, PVALUE_COLUMN};
use tabtest_model::{GtTable, HeaderRecord, TableKind};

const LABEL_COLUMN: &str = "label";

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn header_cell(label: &str) -> Cell {
    Cell::new(strip_markdown(label))
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn strip_markdown(label: &str) -> String {
    label.replace("**", "")
}

/// Superscript marker for the n-th footnote.
fn marker(n: usize) -> String {
    const DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
    n.to_string()
        .chars()
        .filter_map(|c| c.to_digit(10).map(|d| DIGITS[d as usize]))
        .collect()
}

fn cell_text(
    body: &DataFrame,
    header: &HeaderRecord,
    row: usize,
    row_type: Option<&str>,
) -> String {
    let Ok(column) = body.column(&header.column) else {
        return String::new();
    };
    let value = column.get(row).unwrap_or(AnyValue::Null);
    if let Some(formatter) = &header.formatter {
        return any_to_f64(value).map_or_else(String::new, |p| formatter.format(p));
    }
    let text = any_to_string(value);
    if header.column == LABEL_COLUMN && row_type != Some("label") {
        format!("    {text}")
    } else {
        text
    }
}

/// The visible columns of `table` as a terminal table.
pub fn render_table(gt: &GtTable) -> Table {
    let core = gt.core();
    let visible: Vec<&HeaderRecord> = core.header.iter().filter(|h| !h.hide).collect();
    let mut footnotes: Vec<&str> = Vec::new();

    let mut table = Table::new();
    table.set_header(
        visible
            .iter()
            .map(|h| {
                let mut label = strip_markdown(&h.label);
                if let Some(note) = h.footnote.as_deref() {
                    footnotes.push(note);
                    label.push_str(&marker(footnotes.len()));
                }
                header_cell(&label)
            })
            .collect::<Vec<_>>(),
    );
    apply_table_style(&mut table);

    let row_types = core.body.column("row_type").ok();
    for row in 0..core.body.height() {
        let row_type = row_types
            .and_then(|c| c.get(row).ok())
            .map(any_to_string);
        let cells: Vec<Cell> = visible
            .iter()
            .map(|h| Cell::new(cell_text(&core.body, h, row, row_type.as_deref())))
            .collect();
        table.add_row(cells);
    }
    for (index, header) in visible.iter().enumerate() {
        if header.column == PVALUE_COLUMN || header.column.starts_with("stat_") {
            if let Some(column) = table.column_mut(index) {
                column.set_cell_alignment(CellAlignment::Center);
            }
        }
    }
    table
}

/// Footnote and source-note lines printed under the table.
pub fn notes(gt: &GtTable) -> Vec<String> {
    let core = gt.core();
    let mut lines: Vec<String> = core
        .header
        .iter()
        .filter(|h| !h.hide)
        .filter_map(|h| h.footnote.as_deref())
        .enumerate()
        .map(|(i, note)| format!("{} {note}", marker(i + 1)))
        .collect();
    lines.extend(core.source_notes.iter().cloned());
    lines
}

pub fn print_table(gt: &GtTable) {
    println!("{}", render_table(gt));
    for line in notes(gt) {
        println!("{line}");
    }
}

/// Built-in tests of one kind (or every kind).
pub fn registry_table(kind: Option<TableKind>) -> Table {
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => vec![TableKind::Summary, TableKind::Survey, TableKind::Survival],
    };
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Test"),
        header_cell("Footnote"),
        header_cell("Variables"),
        header_cell("Extra arguments"),
    ]);
    apply_table_style(&mut table);
    for kind in kinds {
        for spec in registry(kind) {
            let applies = match spec.applies {
                tabtest_core::Applies::Continuous => "continuous",
                tabtest_core::Applies::Categorical => "categorical",
                tabtest_core::Applies::Any => "any",
            };
            let mut extra = spec.arg_names.join(", ");
            if spec.needs_group {
                if !extra.is_empty() {
                    extra.push_str("; ");
                }
                extra.push_str("needs group");
            }
            table.add_row(vec![
                Cell::new(kind.as_str()),
                Cell::new(spec.id).add_attribute(Attribute::Bold),
                Cell::new(spec.label.unwrap_or("-")),
                Cell::new(applies),
                Cell::new(if extra.is_empty() { "-".to_string() } else { extra }),
            ]);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_superscript() {
        assert_eq!(marker(1), "¹");
        assert_eq!(marker(12), "¹²");
    }

    #[test]
    fn markdown_is_stripped() {
        assert_eq!(strip_markdown("**p-value**"), "p-value");
    }
}
