use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{blocking, AppState, CurrentUser};
use crate::models::UserRecord;
use crate::types::{Credentials, MessageResponse, RefreshRequest, TokenRequest, TokenResponse};
use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};

pub async fn signup(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> GatewayResult<Json<TokenResponse>> {
    let email = credentials.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(GatewayError::BadRequest("A valid email is required".to_string()));
    }
    let tokens = blocking(move || {
        let skip_db = state.config.skip_db;
        if !skip_db && state.db.user_by_email(&email)?.is_some() {
            return Err(GatewayError::Conflict("Email already registered".to_string()));
        }

        let signed = state
            .identity
            .sign_up(&email, &credentials.password)
            .map_err(|e| GatewayError::BadRequest(format!("Auth error: {e}")))?;
        // Providers with email confirmation return no session on sign-up.
        let session = match signed.session {
            Some(session) => session,
            None => state
                .identity
                .sign_in_with_password(&email, &credentials.password)
                .map_err(|e| GatewayError::BadRequest(format!("Auth error: {e}")))?,
        };

        if !skip_db {
            if let Err(e) = state.db.insert_user(&signed.user.id, &email) {
                if let Err(cleanup) = state.identity.delete_user(&signed.user.id) {
                    tracing::error!(error = %cleanup, "could not remove provider user after failed insert");
                }
                return Err(e.into());
            }
        }
        tracing::info!(user_id = %signed.user.id, "user signed up");
        Ok(TokenResponse::bearer(session.access_token, session.refresh_token))
    })
    .await?;
    Ok(Json(tokens))
}

/// Password login. Accepts the OAuth2 form encoding or JSON.
pub async fn token(State(state): State<AppState>, request: Request) -> GatewayResult<Json<TokenResponse>> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let login: TokenRequest = if is_json {
        Json::<TokenRequest>::from_request(request, &state)
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?
            .0
    } else {
        Form::<TokenRequest>::from_request(request, &state)
            .await
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?
            .0
    };

    let tokens = blocking(move || {
        let session = state
            .identity
            .sign_in_with_password(&login.username, &login.password)
            .map_err(|e| {
                tracing::debug!(error = %e, "sign-in rejected");
                GatewayError::Unauthorized("Authentication failed".to_string())
            })?;
        if !state.trusts_identity() && state.db.user_by_id(&session.user.id)?.is_none() {
            return Err(GatewayError::Unauthorized("User not found in database".to_string()));
        }
        Ok(TokenResponse::bearer(session.access_token, session.refresh_token))
    })
    .await?;
    Ok(Json(tokens))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> GatewayResult<Json<TokenResponse>> {
    let tokens = blocking(move || {
        let session = state
            .identity
            .refresh_session(&request.refresh_token)
            .map_err(|e| {
                tracing::debug!(error = %e, "refresh rejected");
                GatewayError::Unauthorized("Invalid refresh token".to_string())
            })?;
        Ok(TokenResponse::bearer(session.access_token, session.refresh_token))
    })
    .await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> GatewayResult<Json<MessageResponse>> {
    blocking(move || {
        state
            .identity
            .sign_out(&current.token)
            .map_err(|e| GatewayError::BadRequest(format!("Logout failed: {e}")))
    })
    .await?;
    Ok(Json(MessageResponse::new("Successfully logged out")))
}

pub async fn me(current: CurrentUser) -> Json<UserRecord> {
    Json(current.user)
}
