use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{blocking, AppState, CurrentUser};
use crate::types::{ChatRequest, ChatResponse};
use axum::extract::State;
use axum::Json;

pub async fn chat(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ChatRequest>,
) -> GatewayResult<Json<ChatResponse>> {
    if request.messages.is_empty() {
        return Err(GatewayError::BadRequest("messages must not be empty".to_string()));
    }
    if !(0.0..=2.0).contains(&request.temperature) {
        return Err(GatewayError::BadRequest(
            "temperature must be between 0 and 2".to_string(),
        ));
    }
    tracing::debug!(
        user_id = %current.user.id,
        messages = request.messages.len(),
        "chat completion requested"
    );
    let response = blocking(move || Ok(state.chat.complete(&request)?)).await?;
    Ok(Json(response))
}
