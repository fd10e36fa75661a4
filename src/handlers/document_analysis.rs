use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{decode_base64, AppState};
use crate::models::AnalysisEnvelope;
use crate::normalize;
use crate::types::{AnalyzerDebug, DocumentAnalysisRequest, DocumentAnalysisResponse};
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// Analyze the first uploaded file and return the normalized P&L envelope.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<DocumentAnalysisRequest>,
) -> GatewayResult<Json<DocumentAnalysisResponse<AnalysisEnvelope>>> {
    let first = request
        .files
        .first()
        .ok_or_else(|| GatewayError::BadRequest("No files provided".to_string()))?;
    let bytes = decode_base64(first)?;
    tracing::info!(
        user_id = request.user_id.as_deref().unwrap_or("-"),
        bytes = bytes.len(),
        files = request.files.len(),
        "document analysis requested"
    );

    let created = Utc::now();
    let analyzer = state.analyzer.clone();
    let outcome = tokio::task::spawn_blocking(move || analyzer.analyze(bytes)).await?;

    match outcome {
        Ok(raw) => {
            let result = normalize::normalize_value(&raw);
            let fields: usize = result.documents.iter().map(|d| d.fields.len()).sum();
            tracing::info!(documents = result.documents.len(), fields, "document analysis completed");
            Ok(Json(DocumentAnalysisResponse {
                success: true,
                degraded: false,
                error: None,
                data: normalize::envelope(result, created, Utc::now()),
            }))
        }
        Err(e) if state.config.document_intelligence.degraded_mode => {
            tracing::warn!(error = %e, "document analysis failed; answering in degraded mode");
            Ok(Json(DocumentAnalysisResponse {
                success: false,
                degraded: true,
                error: Some(e.to_string()),
                data: normalize::degraded_envelope(Utc::now()),
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "document analysis failed");
            Err(e.into())
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "document-analysis" }))
}

/// Credential presence only; never the values.
pub async fn debug(State(state): State<AppState>) -> Json<AnalyzerDebug> {
    let di = &state.config.document_intelligence;
    let len = |v: &Option<String>| v.as_deref().map_or(0, str::len);
    Json(AnalyzerDebug {
        endpoint_set: di.endpoint.is_some(),
        endpoint_length: len(&di.endpoint),
        key_set: di.key.is_some(),
        key_length: len(&di.key),
        model_id: di.model_id.clone(),
        credentials_valid: state.analyzer.is_configured(),
    })
}
