use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{blocking, decode_base64, AppState, CurrentUser};
use crate::models::{AnalyzeResult, FinancialStatement, StatementSummary};
use crate::normalize;
use crate::types::{ParseResponse, UploadRequest};
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::Path as FsPath;

fn not_found() -> GatewayError {
    GatewayError::NotFound("Financial statement not found".to_string())
}

fn statement_id(raw: &str) -> GatewayResult<String> {
    uuid::Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| GatewayError::BadRequest(format!("Invalid statement id: {raw}")))
}

/// Last path component only, so a client cannot write outside its upload directory.
fn safe_file_name(name: &str) -> Option<&str> {
    let base = FsPath::new(name.trim()).file_name()?.to_str()?;
    (!base.is_empty() && base != "." && base != "..").then_some(base)
}

/// On-disk name of an upload. Prefixed with the statement id so re-uploading a name never
/// replaces another statement's file.
fn stored_name(id: &str, file_name: &str) -> String {
    format!("{id}-{file_name}")
}

/// Lower-cased text after the last dot (the whole name when there is none).
fn file_type(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_lowercase()
}

/// `parsed_data` stored for a statement: the first normalized document's fields.
pub(crate) fn parsed_payload(result: &AnalyzeResult, now: DateTime<Utc>) -> Value {
    let document = result.documents.first();
    json!({
        "status": "parsed",
        "timestamp": now.to_rfc3339(),
        "docType": document.map(|d| d.doc_type.as_str()),
        "fields": document.map(|d| json!(d.fields)).unwrap_or_else(|| json!({})),
    })
}

pub async fn list_statements(
    State(state): State<AppState>,
    current: CurrentUser,
) -> GatewayResult<Json<Vec<StatementSummary>>> {
    let statements = blocking(move || Ok(state.db.statements_for_user(&current.user.id)?)).await?;
    Ok(Json(statements.iter().map(StatementSummary::from).collect()))
}

pub async fn get_statement(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> GatewayResult<Json<FinancialStatement>> {
    let id = statement_id(&id)?;
    let statement = blocking(move || {
        state
            .db
            .statement_for_user(&id, &current.user.id)?
            .ok_or_else(not_found)
    })
    .await?;
    Ok(Json(statement))
}

pub async fn upload(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<UploadRequest>,
) -> GatewayResult<Json<StatementSummary>> {
    let file_name = safe_file_name(&request.file_name)
        .ok_or_else(|| GatewayError::BadRequest("Invalid file name".to_string()))?
        .to_string();
    let contents = decode_base64(&request.content_base64)?;

    let statement = blocking(move || {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = state.config.upload_dir.join(&current.user.id);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(stored_name(&id, &file_name));
        std::fs::write(&path, &contents)?;

        let statement = FinancialStatement {
            id,
            user_id: current.user.id.clone(),
            file_type: file_type(&file_name),
            file_path: path.to_string_lossy().into_owned(),
            statement_type: request
                .statement_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            upload_date: Utc::now().to_rfc3339(),
            file_size: contents.len() as i64,
            parsed_data: None,
            metadata: Some(json!({
                "content_type": request.content_type,
                "original_filename": request.file_name,
            })),
            file_name,
        };
        if let Err(e) = state.db.insert_statement(&statement) {
            if let Err(rm) = std::fs::remove_file(&path) {
                tracing::warn!(error = %rm, path = %path.display(), "could not remove orphaned upload");
            }
            return Err(e.into());
        }
        tracing::info!(id = %statement.id, size = statement.file_size, "statement uploaded");
        Ok(statement)
    })
    .await?;
    Ok(Json(StatementSummary::from(&statement)))
}

/// Run the stored file through document analysis and normalization.
pub async fn parse_statement(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> GatewayResult<Json<ParseResponse>> {
    let id = statement_id(&id)?;
    let response = blocking(move || {
        let statement = state
            .db
            .statement_for_user(&id, &current.user.id)?
            .ok_or_else(not_found)?;
        let bytes = std::fs::read(&statement.file_path)?;
        let raw = state.analyzer.analyze(bytes)?;
        let result = normalize::normalize_value(&raw);
        let parsed = parsed_payload(&result, Utc::now());
        state.db.set_parsed_data(&statement.id, &parsed)?;
        tracing::info!(id = %statement.id, "statement parsed");
        Ok(ParseResponse {
            id: statement.id,
            file_name: statement.file_name,
            parsed_data: parsed,
        })
    })
    .await?;
    Ok(Json(response))
}
