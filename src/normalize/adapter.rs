//! Reshapes an upstream analysis payload into the fixed [`AnalyzeResult`] schema.
//!
//! Every attribute of the upstream payload is optional. Absent or malformed attributes
//! become empty defaults here so later stages never probe for presence.

use crate::models::{
    clamp_confidence, AnalyzeResult, Cell, CellKind, KeyValuePair, Line, Page, RawAnalyzeResult,
    RawDocument, RawField, Table, TextElement, Word,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_API_VERSION: &str = "2024-11-30";
pub const DEFAULT_MODEL_ID: &str = "prebuilt-layout";
pub const DEFAULT_STRING_INDEX_TYPE: &str = "utf16CodeUnit";

/// A document as received, fields still keyed by vendor name.
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub doc_type: String,
    pub confidence: f64,
    pub fields: BTreeMap<String, RawField>,
}

/// Adapter output: the normalized skeleton (documents left empty) plus the source documents
/// the field mapper still has to process.
#[derive(Debug, Clone)]
pub struct Adapted {
    pub result: AnalyzeResult,
    pub documents: Vec<SourceDocument>,
}

/// Parse an `analyzeResult` object section by section.
///
/// A section that is present but has the wrong shape is logged and treated as absent;
/// elements inside a section that fail to parse are dropped one by one.
pub fn parse_raw(root: &Value) -> RawAnalyzeResult {
    if !root.is_object() {
        tracing::warn!(kind = json_kind(root), "analysis result is not an object; using empty result");
        return RawAnalyzeResult::default();
    }
    RawAnalyzeResult {
        api_version: text(root, "apiVersion"),
        model_id: text(root, "modelId"),
        string_index_type: text(root, "stringIndexType"),
        content: text(root, "content"),
        pages: section(root, "pages"),
        tables: section(root, "tables"),
        key_value_pairs: section(root, "keyValuePairs"),
        documents: section(root, "documents"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text(root: &Value, key: &str) -> Option<String> {
    match root.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => {
            tracing::warn!(section = key, kind = json_kind(other), "expected a string; ignoring");
            None
        }
    }
}

fn section<T: DeserializeOwned>(root: &Value, key: &str) -> Option<Vec<T>> {
    match root.get(key)? {
        Value::Null => None,
        Value::Array(items) => {
            let parsed: Vec<T> = items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect();
            if parsed.len() < items.len() {
                tracing::warn!(
                    section = key,
                    dropped = items.len() - parsed.len(),
                    "dropped malformed elements"
                );
            }
            Some(parsed)
        }
        other => {
            tracing::warn!(section = key, kind = json_kind(other), "expected an array; ignoring");
            None
        }
    }
}

pub fn adapt(raw: RawAnalyzeResult) -> Adapted {
    let pages = raw
        .pages
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, p)| Page {
            page_number: p.page_number.unwrap_or(i as u32 + 1),
            angle: p.angle.unwrap_or(0.0),
            width: p.width.unwrap_or(0.0),
            height: p.height.unwrap_or(0.0),
            unit: p.unit.unwrap_or_default(),
            words: p
                .words
                .unwrap_or_default()
                .into_iter()
                .map(|w| Word {
                    content: w.content.unwrap_or_default(),
                    polygon: w.polygon.unwrap_or_default(),
                    confidence: clamp_confidence(w.confidence.unwrap_or(0.0)),
                })
                .collect(),
            lines: p
                .lines
                .unwrap_or_default()
                .into_iter()
                .map(|l| Line {
                    content: l.content.unwrap_or_default(),
                    polygon: l.polygon.unwrap_or_default(),
                })
                .collect(),
        })
        .collect();

    let tables = raw
        .tables
        .unwrap_or_default()
        .into_iter()
        .map(|t| {
            let raw_cells = t.cells.unwrap_or_default();
            let received = raw_cells.len();
            // A cell without coordinates cannot be placed in the grid.
            let cells: Vec<Cell> = raw_cells
                .into_iter()
                .filter_map(|c| {
                    Some(Cell {
                        kind: c
                            .kind
                            .as_deref()
                            .map(CellKind::from_upstream)
                            .unwrap_or(CellKind::Content),
                        row_index: c.row_index?,
                        column_index: c.column_index?,
                        content: c.content.unwrap_or_default(),
                    })
                })
                .collect();
            if cells.len() < received {
                tracing::warn!(
                    dropped = received - cells.len(),
                    "table cells without rowIndex/columnIndex dropped"
                );
            }
            Table {
                row_count: t.row_count.unwrap_or(0),
                column_count: t.column_count.unwrap_or(0),
                cells,
            }
        })
        .collect();

    let key_value_pairs = raw
        .key_value_pairs
        .unwrap_or_default()
        .into_iter()
        .map(|kv| KeyValuePair {
            key: TextElement {
                content: kv.key.and_then(|k| k.content).unwrap_or_default(),
            },
            value: TextElement {
                content: kv.value.and_then(|v| v.content).unwrap_or_default(),
            },
            confidence: clamp_confidence(kv.confidence.unwrap_or(0.0)),
        })
        .collect();

    let documents = raw
        .documents
        .unwrap_or_default()
        .into_iter()
        .map(source_document)
        .collect();

    Adapted {
        result: AnalyzeResult {
            api_version: raw
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            model_id: raw.model_id.unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            string_index_type: raw
                .string_index_type
                .unwrap_or_else(|| DEFAULT_STRING_INDEX_TYPE.to_string()),
            content: raw.content.unwrap_or_default(),
            pages,
            tables,
            key_value_pairs,
            documents: Vec::new(),
        },
        documents,
    }
}

fn source_document(doc: RawDocument) -> SourceDocument {
    SourceDocument {
        doc_type: doc.doc_type.unwrap_or_default(),
        confidence: clamp_confidence(doc.confidence.unwrap_or(0.0)),
        fields: doc.fields.unwrap_or_default(),
    }
}
