use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{blocking, AppState, CurrentUser};
use crate::services::{MemoryRecord, MemoryStore};
use crate::types::{MemoryCreate, MemoryUpdate, MessageResponse, Pagination};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{Map, Value};

fn owned_metadata(metadata: Option<Map<String, Value>>, user_id: &str) -> Map<String, Value> {
    let mut metadata = metadata.unwrap_or_default();
    metadata.insert("user_id".to_string(), Value::String(user_id.to_string()));
    metadata
}

/// Fetch a memory the caller owns. `action` completes "Not authorized to ... this memory".
fn owned(
    store: &dyn MemoryStore,
    id: &str,
    user_id: &str,
    action: &str,
) -> GatewayResult<MemoryRecord> {
    let record = store
        .get(id)?
        .ok_or_else(|| GatewayError::NotFound("Memory not found".to_string()))?;
    if record.owner() != Some(user_id) {
        return Err(GatewayError::Forbidden(format!(
            "Not authorized to {action} this memory"
        )));
    }
    Ok(record)
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<MemoryCreate>,
) -> GatewayResult<Json<MemoryRecord>> {
    let record = blocking(move || {
        let metadata = owned_metadata(request.metadata, &current.user.id);
        Ok(state.memory.add(&request.content, metadata)?)
    })
    .await?;
    Ok(Json(record))
}

pub async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(page): Query<Pagination>,
) -> GatewayResult<Json<Vec<MemoryRecord>>> {
    let limit = page.limit.clamp(1, 100);
    let records = blocking(move || {
        Ok(state
            .memory
            .list(&current.user.id, limit, page.offset)?)
    })
    .await?;
    Ok(Json(records))
}

pub async fn get(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> GatewayResult<Json<MemoryRecord>> {
    let record =
        blocking(move || owned(state.memory.as_ref(), &id, &current.user.id, "access")).await?;
    Ok(Json(record))
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<MemoryUpdate>,
) -> GatewayResult<Json<MemoryRecord>> {
    let record = blocking(move || {
        let user_id = current.user.id.as_str();
        owned(state.memory.as_ref(), &id, user_id, "modify")?;
        let metadata = request.metadata.map(|m| owned_metadata(Some(m), user_id));
        state
            .memory
            .update(&id, request.content, metadata)?
            .ok_or_else(|| GatewayError::NotFound("Memory not found".to_string()))
    })
    .await?;
    Ok(Json(record))
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> GatewayResult<Json<MessageResponse>> {
    blocking(move || {
        owned(state.memory.as_ref(), &id, &current.user.id, "delete")?;
        if !state.memory.delete(&id)? {
            return Err(GatewayError::NotFound("Memory not found".to_string()));
        }
        Ok(())
    })
    .await?;
    Ok(Json(MessageResponse::new("Memory deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryStore;
    use serde_json::json;

    #[test]
    fn user_id_is_forced_over_client_metadata() {
        let mut supplied = Map::new();
        supplied.insert("user_id".into(), json!("someone-else"));
        supplied.insert("topic".into(), json!("q4"));
        let metadata = owned_metadata(Some(supplied), "me");
        assert_eq!(metadata["user_id"], "me");
        assert_eq!(metadata["topic"], "q4");
    }

    #[test]
    fn ownership_is_checked() {
        let store = InMemoryStore::new();
        let record = store.add("note", owned_metadata(None, "owner")).unwrap();
        assert!(owned(&store, &record.id, "owner", "access").is_ok());
        assert!(matches!(
            owned(&store, &record.id, "intruder", "access"),
            Err(GatewayError::Forbidden(msg)) if msg == "Not authorized to access this memory"
        ));
        assert!(matches!(
            owned(&store, "missing", "owner", "access"),
            Err(GatewayError::NotFound(_))
        ));
    }
}
