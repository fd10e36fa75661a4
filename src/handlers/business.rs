use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{blocking, AppState, CurrentUser};
use crate::services::graph::{self, Row};
use crate::types::{EntityCreate, GraphQuery, RelationshipCreate};
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Map, Value};

fn identifier<'a>(kind: &str, name: &'a str) -> GatewayResult<&'a str> {
    if graph::is_identifier(name) {
        Ok(name)
    } else {
        Err(GatewayError::BadRequest(format!("Invalid {kind}: {name:?}")))
    }
}

fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter().filter_map(|r| r.get(name).cloned()).collect()
}

async fn run(state: AppState, query: String, params: Map<String, Value>) -> GatewayResult<Vec<Row>> {
    blocking(move || Ok(state.graph.run(&query, params)?)).await
}

pub async fn create_entity(
    State(state): State<AppState>,
    _current: CurrentUser,
    Json(request): Json<EntityCreate>,
) -> GatewayResult<Json<Value>> {
    let query = graph::create_entity_query(identifier("entity type", &request.entity_type)?);
    let mut params = Map::new();
    params.insert("properties".into(), Value::Object(request.properties));
    let rows = run(state, query, params).await?;
    Ok(Json(json!({ "success": true, "entity": column(&rows, "e").into_iter().next() })))
}

pub async fn list_entities(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(entity_type): Path<String>,
) -> GatewayResult<Json<Value>> {
    let query = graph::list_entities_query(identifier("entity type", &entity_type)?);
    let rows = run(state, query, Map::new()).await?;
    Ok(Json(json!({ "entities": column(&rows, "e") })))
}

pub async fn create_relationship(
    State(state): State<AppState>,
    _current: CurrentUser,
    Json(request): Json<RelationshipCreate>,
) -> GatewayResult<Json<Value>> {
    let query = graph::create_relationship_query(
        identifier("entity type", &request.from_type)?,
        identifier("entity type", &request.to_type)?,
        identifier("relationship type", &request.relationship_type)?,
    );
    let mut params = Map::new();
    params.insert("from_id".into(), Value::String(request.from_id));
    params.insert("to_id".into(), Value::String(request.to_id));
    params.insert("properties".into(), Value::Object(request.properties));
    let rows = run(state, query, params).await?;
    Ok(Json(json!({ "success": true, "relationship": column(&rows, "r").into_iter().next() })))
}

pub async fn schema(State(state): State<AppState>, _current: CurrentUser) -> GatewayResult<Json<Value>> {
    let rows = run(state, graph::SCHEMA_QUERY.to_string(), Map::new()).await?;
    Ok(Json(json!({ "schema": rows })))
}

/// Caller-supplied query text, passed through with its parameters.
pub async fn query(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<GraphQuery>,
) -> GatewayResult<Json<Value>> {
    if request.query.trim().is_empty() {
        return Err(GatewayError::BadRequest("query must not be empty".to_string()));
    }
    tracing::info!(user_id = %current.user.id, "custom graph query");
    let rows = run(state, request.query, request.params).await?;
    Ok(Json(json!({ "results": rows })))
}
