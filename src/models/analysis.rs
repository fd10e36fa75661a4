//! Document-analysis payloads: the upstream shape as received (every attribute optional)
//! and the normalized shape returned to clients.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Upstream (raw) shape
// ---------------------------------------------------------------------------

/// `analyzeResult` as returned by the document-understanding service.
///
/// Nothing here is trusted to be present. Sequences are parsed element by element so a
/// single malformed page, cell or field is dropped instead of failing the whole result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAnalyzeResult {
    pub api_version: Option<String>,
    pub model_id: Option<String>,
    pub string_index_type: Option<String>,
    pub content: Option<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub pages: Option<Vec<RawPage>>,
    #[serde(deserialize_with = "lenient_seq")]
    pub tables: Option<Vec<RawTable>>,
    #[serde(deserialize_with = "lenient_seq")]
    pub key_value_pairs: Option<Vec<RawKeyValuePair>>,
    #[serde(deserialize_with = "lenient_seq")]
    pub documents: Option<Vec<RawDocument>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPage {
    pub page_number: Option<u32>,
    pub angle: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub unit: Option<String>,
    #[serde(deserialize_with = "lenient_seq")]
    pub words: Option<Vec<RawWord>>,
    #[serde(deserialize_with = "lenient_seq")]
    pub lines: Option<Vec<RawLine>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawWord {
    pub content: Option<String>,
    pub polygon: Option<Vec<f64>>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLine {
    pub content: Option<String>,
    pub polygon: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTable {
    pub row_count: Option<u32>,
    pub column_count: Option<u32>,
    #[serde(deserialize_with = "lenient_seq")]
    pub cells: Option<Vec<RawCell>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCell {
    pub kind: Option<String>,
    pub row_index: Option<usize>,
    pub column_index: Option<usize>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawKeyValuePair {
    pub key: Option<RawTextElement>,
    pub value: Option<RawTextElement>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTextElement {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDocument {
    pub doc_type: Option<String>,
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "lenient_map")]
    pub fields: Option<BTreeMap<String, RawField>>,
}

/// One recognized field of a document. Which `value*` attribute is set depends on the
/// field's upstream `type`, which is not kept: coercion reads whatever value is present.
/// `content` is the raw text the service read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawField {
    pub value_number: Option<f64>,
    pub value_integer: Option<i64>,
    pub value_currency: Option<RawCurrency>,
    pub value_string: Option<String>,
    pub content: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCurrency {
    pub amount: Option<f64>,
    pub currency_code: Option<String>,
}

fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

fn lenient_map<'de, D, T>(deserializer: D) -> Result<Option<BTreeMap<String, T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Object(entries)) => Some(
            entries
                .into_iter()
                .filter_map(|(name, value)| serde_json::from_value(value).ok().map(|v| (name, v)))
                .collect(),
        ),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Normalized shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    pub api_version: String,
    pub model_id: String,
    pub string_index_type: String,
    pub content: String,
    pub pages: Vec<Page>,
    pub tables: Vec<Table>,
    pub key_value_pairs: Vec<KeyValuePair>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_number: u32,
    pub angle: f64,
    pub width: f64,
    pub height: f64,
    pub unit: String,
    pub words: Vec<Word>,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub content: String,
    pub polygon: Vec<f64>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub content: String,
    pub polygon: Vec<f64>,
}

/// Cell `(row_index, column_index)` pairs are expected to be unique within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub row_count: u32,
    pub column_count: u32,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub kind: CellKind,
    pub row_index: usize,
    pub column_index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Content,
    Header,
}

impl CellKind {
    /// Upstream kinds are `content`, `rowHeader`, `columnHeader`, `stubHead` and
    /// `description`; every header-like kind collapses to `Header`.
    pub fn from_upstream(kind: &str) -> Self {
        let lower = kind.to_lowercase();
        if lower.contains("header") || lower == "stubhead" {
            CellKind::Header
        } else {
            CellKind::Content
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: TextElement,
    pub value: TextElement,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub doc_type: String,
    pub fields: BTreeMap<String, ExtractedField>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Currency,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

/// A normalized field. `Currency` fields always carry a finite number; build them through
/// [`ExtractedField::currency`], which degrades to a string field otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: FieldValue,
    pub value_string: String,
    pub confidence: f64,
    pub content: String,
}

impl ExtractedField {
    pub fn currency(value: f64, value_string: String, confidence: f64, content: String) -> Self {
        if !value.is_finite() {
            return Self::text(value_string, confidence, content);
        }
        Self {
            field_type: FieldType::Currency,
            value: FieldValue::Number(value),
            value_string,
            confidence: clamp_confidence(confidence),
            content,
        }
    }

    pub fn text(value_string: String, confidence: f64, content: String) -> Self {
        Self {
            field_type: FieldType::String,
            value: FieldValue::Text(value_string.clone()),
            value_string,
            confidence: clamp_confidence(confidence),
            content,
        }
    }
}

pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Succeeded,
    Degraded,
}

/// Wire envelope returned to clients. Only the two timestamps vary between runs over the
/// same input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEnvelope {
    pub status: AnalysisStatus,
    pub created_date_time: DateTime<Utc>,
    pub last_updated_date_time: DateTime<Utc>,
    pub analyze_result: AnalyzeResult,
}
