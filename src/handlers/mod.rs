//! HTTP handlers. Collaborator calls are blocking and always run through [`blocking`].

pub mod auth;
pub mod business;
pub mod chat;
pub mod document_analysis;
pub mod financial;
pub mod health;
pub mod memory;

use crate::config::AppConfig;
use crate::db::{Db, DbError};
use crate::error::{GatewayError, GatewayResult};
use crate::models::UserRecord;
use crate::services::{
    AzureDocumentIntelligence, ChatProvider, DocumentAnalyzer, GoTrueIdentity, GraphStore,
    IdentityProvider, InMemoryStore, MemoryStore, Neo4jHttp, OpenAiChat, StubIdentity, ZepMemory,
};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;

/// Shared handler state. Every collaborator is built once at startup and injected here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Db>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub chat: Arc<dyn ChatProvider>,
    pub memory: Arc<dyn MemoryStore>,
    pub graph: Arc<dyn GraphStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Real collaborators, or their offline stand-ins when `offline` is set.
    pub fn from_config(config: AppConfig) -> Result<Self, DbError> {
        let db = if config.skip_db {
            tracing::info!("SKIP_DB set; using an in-memory database");
            Db::in_memory()?
        } else {
            tracing::info!(path = %config.database_path.display(), "opening database");
            Db::open(&config.database_path)?
        };
        let identity: Arc<dyn IdentityProvider> = if config.offline {
            Arc::new(StubIdentity::new())
        } else {
            Arc::new(GoTrueIdentity::new(config.identity.clone()))
        };
        let memory: Arc<dyn MemoryStore> = if config.offline {
            Arc::new(InMemoryStore::new())
        } else {
            Arc::new(ZepMemory::new(config.memory.clone()))
        };
        Ok(Self {
            db: Arc::new(db),
            analyzer: Arc::new(AzureDocumentIntelligence::new(
                config.document_intelligence.clone(),
            )),
            chat: Arc::new(OpenAiChat::new(config.chat.clone())),
            graph: Arc::new(Neo4jHttp::new(config.graph.clone())),
            memory,
            identity,
            config: Arc::new(config),
        })
    }

    /// A verified identity is enough; no local user row is required.
    pub fn trusts_identity(&self) -> bool {
        self.config.skip_db || self.config.offline
    }
}

/// Run blocking collaborator work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> GatewayResult<T>
where
    F: FnOnce() -> GatewayResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Decode a base64 payload, tolerating a `data:<mime>;base64,` prefix.
pub(crate) fn decode_base64(payload: &str) -> GatewayResult<Vec<u8>> {
    let data = match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => payload,
    };
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| GatewayError::BadRequest(format!("Invalid base64 content: {e}")))?;
    if bytes.is_empty() {
        return Err(GatewayError::BadRequest("File content is empty".to_string()));
    }
    Ok(bytes)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Caller resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRecord,
    pub token: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(GatewayError::credentials)?;
        let identity = state.identity.clone();
        let db = state.db.clone();
        let trust = state.trusts_identity();
        let lookup_token = token.clone();

        let user = blocking(move || {
            let verified = identity.get_user(&lookup_token).map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                GatewayError::credentials()
            })?;
            if trust {
                return Ok(UserRecord {
                    id: verified.id,
                    email: verified.email,
                    is_active: true,
                });
            }
            match db.user_by_id(&verified.id) {
                Ok(Some(user)) if user.is_active => Ok(user),
                Ok(_) => Err(GatewayError::credentials()),
                Err(e) => {
                    tracing::warn!(error = %e, "user lookup failed");
                    Err(GatewayError::credentials())
                }
            }
        })
        .await?;

        Ok(CurrentUser { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("xyz"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn base64_payloads() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64("data:application/pdf;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(matches!(decode_base64("***"), Err(GatewayError::BadRequest(_))));
        assert!(matches!(decode_base64(""), Err(GatewayError::BadRequest(_))));
    }
}
