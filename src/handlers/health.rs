use crate::handlers::AppState;
use crate::services::graph::PROBE_QUERY;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Map, Value};

pub async fn root() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "CFO App backend is running" }))
}

/// Always 200. Reports `degraded` with the failing component's error instead of failing.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let timestamp = Utc::now().to_rfc3339();
    let db = state.db.clone();
    let database = match tokio::task::spawn_blocking(move || db.ping()).await {
        Ok(Ok(())) => "connected".to_string(),
        Ok(Err(e)) => format!("error: {e}"),
        Err(e) => format!("error: {e}"),
    };
    let database_ok = database == "connected";

    if state.config.offline {
        return Json(json!({
            "status": if database_ok { "healthy" } else { "degraded" },
            "database": database,
            "graph": "skipped",
            "timestamp": timestamp,
        }));
    }

    let graph = state.graph.clone();
    let probe = tokio::task::spawn_blocking(move || graph.run(PROBE_QUERY, Map::new())).await;
    let graph_error = match probe {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(e.to_string()),
    };
    if let Some(error) = &graph_error {
        tracing::warn!(error = %error, "graph health probe failed");
    }

    let mut body = json!({
        "status": if database_ok && graph_error.is_none() { "healthy" } else { "degraded" },
        "database": database,
        "graph": if graph_error.is_none() { "connected" } else { "error" },
        "timestamp": timestamp,
    });
    if let Some(error) = graph_error {
        body["graph_error"] = Value::String(error);
    }
    Json(body)
}
