//! P&L field normalization: raw analysis result -> normalized field map.
//!
//! `adapter` fixes the shape, `mapper` names the fields, `coerce` reads numbers and
//! `table_fallback` covers documents that came back without any fields. Everything here
//! is synchronous and free of side effects apart from logging.

pub mod adapter;
pub mod coerce;
pub mod mapper;
pub mod table_fallback;

use crate::models::{
    AnalysisEnvelope, AnalysisStatus, AnalyzeResult, Document, ExtractedField, RawAnalyzeResult,
    Table,
};
use adapter::SourceDocument;
use chrono::{DateTime, Utc};
use mapper::MatchKind;
use serde_json::Value;
use std::collections::BTreeMap;

pub use mapper::CanonicalField;

/// Doc type of the document built from tables when the service returned none.
pub const SYNTHETIC_DOC_TYPE: &str = "prebuilt:layout";
pub const SYNTHETIC_DOC_CONFIDENCE: f64 = 0.8;

/// Accepts either a full operation response (`{"status": ..., "analyzeResult": {...}}`)
/// or a bare `analyzeResult` object.
pub fn analyze_result_of(root: &Value) -> &Value {
    match root.get("analyzeResult") {
        Some(inner) if inner.is_object() => inner,
        _ => root,
    }
}

pub fn normalize_value(root: &Value) -> AnalyzeResult {
    normalize(adapter::parse_raw(analyze_result_of(root)))
}

pub fn normalize(raw: RawAnalyzeResult) -> AnalyzeResult {
    let adapter::Adapted {
        mut result,
        documents,
    } = adapter::adapt(raw);

    if documents.is_empty() {
        tracing::info!(
            tables = result.tables.len(),
            "no structured documents; extracting fields from tables"
        );
        result.documents.push(Document {
            doc_type: SYNTHETIC_DOC_TYPE.to_string(),
            fields: table_fields(&result.tables),
            confidence: SYNTHETIC_DOC_CONFIDENCE,
        });
    } else {
        result.documents = documents
            .into_iter()
            .map(|doc| map_document(doc, &result.tables))
            .collect();
    }
    result
}

fn table_fields(tables: &[Table]) -> BTreeMap<String, ExtractedField> {
    table_fallback::extract_from_tables(tables)
        .into_iter()
        .map(|(field, extracted)| (field.as_str().to_string(), extracted))
        .collect()
}

/// Several vendor names can land on the same key. A stronger match replaces a weaker one;
/// on a tie the first name in sorted order keeps the key.
fn map_document(doc: SourceDocument, tables: &[Table]) -> Document {
    if doc.fields.is_empty() {
        tracing::debug!(doc_type = %doc.doc_type, "document has no fields; using tables");
        return Document {
            doc_type: doc.doc_type,
            fields: table_fields(tables),
            confidence: doc.confidence,
        };
    }

    let mut mapped: BTreeMap<String, (MatchKind, ExtractedField)> = BTreeMap::new();
    for (name, raw) in &doc.fields {
        let field = mapper::map_field(name, raw);
        let key = field.key.as_str().to_string();
        let replace = mapped
            .get(&key)
            .map_or(true, |(kind, _)| field.matched_by > *kind);
        if replace {
            tracing::debug!(vendor = %name, key = %key, matched_by = ?field.matched_by, "mapped field");
            mapped.insert(key, (field.matched_by, field.field));
        }
    }

    Document {
        doc_type: doc.doc_type,
        fields: mapped
            .into_iter()
            .map(|(key, (_, field))| (key, field))
            .collect(),
        confidence: doc.confidence,
    }
}

pub fn envelope(
    result: AnalyzeResult,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
) -> AnalysisEnvelope {
    AnalysisEnvelope {
        status: AnalysisStatus::Succeeded,
        created_date_time: created,
        last_updated_date_time: updated,
        analyze_result: result,
    }
}

/// Placeholder returned when the upstream call failed and degraded mode is on. Carries no
/// pages, tables or fields.
pub fn degraded_envelope(now: DateTime<Utc>) -> AnalysisEnvelope {
    AnalysisEnvelope {
        status: AnalysisStatus::Degraded,
        created_date_time: now,
        last_updated_date_time: now,
        analyze_result: adapter::adapt(RawAnalyzeResult::default()).result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, FieldValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn table_rows(rows: &[(&str, &str)]) -> Value {
        let cells: Vec<Value> = rows
            .iter()
            .enumerate()
            .flat_map(|(r, (label, value))| {
                [
                    json!({"rowIndex": r, "columnIndex": 0, "content": label}),
                    json!({"rowIndex": r, "columnIndex": 1, "content": value}),
                ]
            })
            .collect();
        json!({"rowCount": rows.len(), "columnCount": 2, "cells": cells})
    }

    #[test]
    fn empty_documents_build_one_synthetic_document() {
        let result = normalize_value(&json!({
            "documents": [],
            "tables": [table_rows(&[("Revenue", "$50,000"), ("Net Income", "$10,000")])]
        }));
        assert_eq!(result.documents.len(), 1);
        let doc = &result.documents[0];
        assert_eq!(doc.doc_type, SYNTHETIC_DOC_TYPE);
        assert_eq!(doc.confidence, SYNTHETIC_DOC_CONFIDENCE);
        assert_eq!(doc.fields.len(), 2);
        assert_eq!(doc.fields["pnl_total_revenue"].value, FieldValue::Number(50000.0));
        assert_eq!(doc.fields["pnl_net_income"].value, FieldValue::Number(10000.0));
    }

    #[test]
    fn synthetic_document_present_even_without_tables() {
        let result = normalize_value(&json!({}));
        assert_eq!(result.documents.len(), 1);
        assert!(result.documents[0].fields.is_empty());
    }

    #[test]
    fn document_fields_are_mapped_and_tables_ignored() {
        let result = normalize_value(&json!({
            "documents": [{"docType": "custom:pnl", "confidence": 0.93, "fields": {
                "COGS": {"type": "currency", "content": "$5,000", "confidence": 0.9},
                "ReportingPeriod": {"type": "string", "valueString": "Fiscal year", "content": "Fiscal year"}
            }}],
            "tables": [table_rows(&[("Revenue", "$1")])]
        }));
        let doc = &result.documents[0];
        assert_eq!(doc.fields.len(), 2);
        let cogs = &doc.fields["pnl_cost_of_goods_sold"];
        assert_eq!(cogs.field_type, FieldType::Currency);
        assert_eq!(cogs.value, FieldValue::Number(5000.0));
        assert_eq!(doc.fields["reportingperiod"].field_type, FieldType::String);
        assert!(!doc.fields.contains_key("pnl_total_revenue"));
    }

    #[test]
    fn digits_inside_a_value_string_coerce_to_currency() {
        let result = normalize_value(&json!({
            "documents": [{"fields": {
                "ReportingPeriod": {"type": "string", "valueString": "FY2024", "content": "FY2024"}
            }}]
        }));
        let period = &result.documents[0].fields["reportingperiod"];
        assert_eq!(period.field_type, FieldType::Currency);
        assert_eq!(period.value, FieldValue::Number(2024.0));
    }

    #[test]
    fn cells_without_coordinates_do_not_shadow_row_labels() {
        let result = normalize_value(&json!({"tables": [{"cells": [
            {"content": "Total Revenue"},
            {"rowIndex": 0, "columnIndex": 0, "content": "Net Income"},
            {"rowIndex": 0, "columnIndex": 1, "content": "$4"}
        ]}]}));
        let fields = &result.documents[0].fields;
        assert_eq!(fields["pnl_net_income"].value, FieldValue::Number(4.0));
        assert!(!fields.contains_key("pnl_total_revenue"));
    }

    #[test]
    fn fieldless_document_falls_back_to_tables() {
        let result = normalize_value(&json!({
            "documents": [{"docType": "custom:pnl", "confidence": 0.5, "fields": {}}],
            "tables": [table_rows(&[("Gross Profit", "$0.00")])]
        }));
        let doc = &result.documents[0];
        assert_eq!(doc.doc_type, "custom:pnl");
        assert_eq!(doc.fields["pnl_gross_profit"].value, FieldValue::Number(0.0));
    }

    #[test]
    fn alias_beats_keyword_for_the_same_key() {
        let result = normalize_value(&json!({
            "documents": [{"fields": {
                "AnnualRevenue": {"content": "$1"},
                "Sales": {"content": "$2"}
            }}]
        }));
        let revenue = &result.documents[0].fields["pnl_total_revenue"];
        assert_eq!(revenue.value, FieldValue::Number(2.0));
    }

    #[test]
    fn same_strength_keeps_first_name_in_order() {
        let result = normalize_value(&json!({
            "documents": [{"fields": {
                "Sales": {"content": "$2"},
                "Revenue": {"content": "$1"}
            }}]
        }));
        let revenue = &result.documents[0].fields["pnl_total_revenue"];
        assert_eq!(revenue.value, FieldValue::Number(1.0));
    }

    #[test]
    fn operation_response_is_unwrapped() {
        let result = normalize_value(&json!({
            "status": "succeeded",
            "analyzeResult": {"modelId": "prebuilt-invoice", "content": "hello"}
        }));
        assert_eq!(result.model_id, "prebuilt-invoice");
        assert_eq!(result.content, "hello");
    }

    #[test]
    fn running_twice_is_byte_identical() {
        let input = json!({
            "content": "Statement",
            "pages": [{"pageNumber": 1, "words": [{"content": "Revenue", "confidence": 0.99}]}],
            "tables": [table_rows(&[("Revenue", "$50,000"), ("COGS", "$20,000")])],
            "documents": [{"docType": "d", "fields": {
                "NetIncome": {"valueNumber": 30000.0, "content": "$30,000"},
                "Memo": {"content": "n/a"}
            }}]
        });
        let first = serde_json::to_string(&normalize_value(&input)).unwrap();
        let second = serde_json::to_string(&normalize_value(&input)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn degraded_envelope_has_no_figures() {
        let now = Utc::now();
        let env = degraded_envelope(now);
        assert_eq!(env.status, AnalysisStatus::Degraded);
        assert!(env.analyze_result.documents.is_empty());
        assert!(env.analyze_result.tables.is_empty());
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], "degraded");
    }

    #[test]
    fn envelope_wraps_result_with_timestamps() {
        let created = Utc::now();
        let env = envelope(normalize_value(&json!({})), created, created);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert!(value["createdDateTime"].is_string());
        assert!(value["analyzeResult"]["documents"].is_array());
    }
}
