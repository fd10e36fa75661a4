//! External collaborators. Each sits behind a blocking trait so handlers can run calls on
//! `spawn_blocking` and tests can swap in fakes.

pub mod chat;
pub mod document_intelligence;
pub mod graph;
pub mod identity;
pub mod memory;

use crate::error::UpstreamError;
use reqwest::blocking::{Client, Response};
use std::time::Duration;

pub use chat::{ChatProvider, OpenAiChat};
pub use document_intelligence::{AzureDocumentIntelligence, DocumentAnalyzer};
pub use graph::{GraphStore, Neo4jHttp};
pub use identity::{GoTrueIdentity, IdentityProvider, IdentityUser, Session, StubIdentity};
pub use memory::{InMemoryStore, MemoryRecord, MemoryStore, ZepMemory};

/// Fresh blocking client per call. Must not be called on an async worker thread.
pub(crate) fn http_client(service: &'static str, timeout: Duration) -> Result<Client, UpstreamError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| UpstreamError::Failed {
            service,
            message: e.to_string(),
        })
}

/// Non-2xx responses become [`UpstreamError::Status`] carrying the body text.
pub(crate) fn check_status(service: &'static str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(UpstreamError::Status {
        service,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

pub(crate) fn require<'a>(
    service: &'static str,
    missing: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, UpstreamError> {
    value
        .as_deref()
        .ok_or(UpstreamError::NotConfigured { service, missing })
}
