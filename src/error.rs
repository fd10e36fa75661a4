use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failure talking to an external collaborator. `service` names the collaborator
/// ("document intelligence", "chat", ...) for log lines and client messages.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} is not configured: {missing} not set")]
    NotConfigured {
        service: &'static str,
        missing: &'static str,
    },
    #[error("{service} unreachable: {message}")]
    Network {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} sent an unexpected response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
    #[error("{service} timed out")]
    Timeout { service: &'static str },
    #[error("{service} failed: {message}")]
    Failed {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    /// Classify a transport error the way the desktop client reported them: connection and
    /// timeout problems are the caller's network, everything else is a generic failure.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout { service }
        } else if err.is_connect() {
            UpstreamError::Network {
                service,
                message: "check the network connection and try again".to_string(),
            }
        } else if err.is_decode() {
            UpstreamError::InvalidResponse {
                service,
                message: err.to_string(),
            }
        } else {
            UpstreamError::Network {
                service,
                message: err.to_string(),
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors surfaced by HTTP handlers. Rendered as `{"detail": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("database error: {0}")]
    Database(#[from] crate::db::DbError),
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn credentials() -> Self {
        GatewayError::Unauthorized("Could not validate credentials".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) | GatewayError::Conflict(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Database(_)
            | GatewayError::Io(_)
            | GatewayError::Json(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::Internal(format!("worker task failed: {err}"))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let mut response = (status, Json(json!({ "detail": self.to_string() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
