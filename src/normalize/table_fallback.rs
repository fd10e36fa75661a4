//! Label/value scan over table cells, used when a document yields no mapped fields.
//!
//! Rows are read in ascending row order, tables in document order. Column 0 is the row
//! label; the value is the rightmost other column that parses as a currency amount. The
//! first row to claim a canonical field keeps it.

use crate::models::{ExtractedField, Table};
use crate::normalize::coerce;
use crate::normalize::mapper::{classify_label, CanonicalField};
use std::collections::BTreeMap;

pub const TABLE_FIELD_CONFIDENCE: f64 = 0.8;

/// `row -> column -> cell text`. Duplicate coordinates keep the first cell seen.
fn grid(table: &Table) -> BTreeMap<usize, BTreeMap<usize, &str>> {
    let mut rows: BTreeMap<usize, BTreeMap<usize, &str>> = BTreeMap::new();
    for cell in &table.cells {
        rows.entry(cell.row_index)
            .or_default()
            .entry(cell.column_index)
            .or_insert(cell.content.trim());
    }
    rows
}

/// Rightmost column after the label whose text coerces to a number, with its raw text.
fn row_value<'a>(row: &BTreeMap<usize, &'a str>) -> Option<(f64, &'a str)> {
    row.iter()
        .rev()
        .filter(|(col, text)| **col > 0 && !text.is_empty())
        .find_map(|(_, text)| coerce::from_cell_text(text).ok().map(|v| (v, *text)))
}

pub fn extract_from_tables(tables: &[Table]) -> BTreeMap<CanonicalField, ExtractedField> {
    let mut fields = BTreeMap::new();
    for table in tables {
        for row in grid(table).values() {
            let Some(label) = row.get(&0) else {
                continue;
            };
            let Some(canonical) = classify_label(&label.to_lowercase()) else {
                continue;
            };
            if fields.contains_key(&canonical) {
                continue;
            }
            let Some((value, text)) = row_value(row) else {
                continue;
            };
            tracing::debug!(field = %canonical, value, label = %label, "table row matched");
            fields.insert(
                canonical,
                ExtractedField::currency(
                    value,
                    value.to_string(),
                    TABLE_FIELD_CONFIDENCE,
                    text.to_string(),
                ),
            );
        }
    }
    fields
}
