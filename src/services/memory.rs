use crate::config::MemoryConfig;
use crate::error::UpstreamError;
use crate::services::{check_status, http_client, require};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use std::time::Duration;

const SERVICE: &str = "memory";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn owner(&self) -> Option<&str> {
        self.metadata.get("user_id").and_then(|v| v.as_str())
    }
}

/// Vector-memory store. Ownership is recorded in `metadata.user_id`; callers enforce it.
pub trait MemoryStore: Send + Sync {
    fn add(&self, content: &str, metadata: Map<String, Value>) -> Result<MemoryRecord, UpstreamError>;
    fn get(&self, id: &str) -> Result<Option<MemoryRecord>, UpstreamError>;
    fn list(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<MemoryRecord>, UpstreamError>;
    /// `None` leaves the attribute untouched. Returns `None` when the id is unknown.
    fn update(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Option<MemoryRecord>, UpstreamError>;
    fn delete(&self, id: &str) -> Result<bool, UpstreamError>;
}

/// Zep REST API (`/api/v1/memory`).
pub struct ZepMemory {
    config: MemoryConfig,
}

impl ZepMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::blocking::RequestBuilder, UpstreamError> {
        let base = require(SERVICE, "ZEP_API_URL", &self.config.api_url)?;
        let key = require(SERVICE, "ZEP_API_KEY", &self.config.api_key)?;
        let client = http_client(SERVICE, Duration::from_secs(30))?;
        Ok(client
            .request(method, format!("{base}/api/v1/memory{path}"))
            .header("accept", "application/json")
            .bearer_auth(key))
    }

    fn send(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> Result<Option<reqwest::blocking::Response>, UpstreamError> {
        let response = builder
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(SERVICE, response).map(Some)
    }

    fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, UpstreamError> {
        response
            .json()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))
    }

    fn missing(id: &str) -> UpstreamError {
        UpstreamError::InvalidResponse {
            service: SERVICE,
            message: format!("memory {id} vanished during the request"),
        }
    }
}

impl MemoryStore for ZepMemory {
    fn add(&self, content: &str, metadata: Map<String, Value>) -> Result<MemoryRecord, UpstreamError> {
        let builder = self
            .request(reqwest::Method::POST, "")?
            .json(&json!({ "content": content, "metadata": metadata }));
        let response = self.send(builder)?.ok_or_else(|| Self::missing("new"))?;
        Self::decode(response)
    }

    fn get(&self, id: &str) -> Result<Option<MemoryRecord>, UpstreamError> {
        let builder = self.request(reqwest::Method::GET, &format!("/{id}"))?;
        self.send(builder)?.map(Self::decode).transpose()
    }

    fn list(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<MemoryRecord>, UpstreamError> {
        let builder = self.request(reqwest::Method::GET, "")?.query(&[
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("metadata.user_id", user_id.to_string()),
        ]);
        match self.send(builder)? {
            Some(response) => Self::decode(response),
            None => Ok(Vec::new()),
        }
    }

    fn update(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Option<MemoryRecord>, UpstreamError> {
        let mut body = Map::new();
        if let Some(content) = content {
            body.insert("content".into(), Value::String(content));
        }
        if let Some(metadata) = metadata {
            body.insert("metadata".into(), Value::Object(metadata));
        }
        let builder = self
            .request(reqwest::Method::PUT, &format!("/{id}"))?
            .json(&body);
        self.send(builder)?.map(Self::decode).transpose()
    }

    fn delete(&self, id: &str) -> Result<bool, UpstreamError> {
        let builder = self.request(reqwest::Method::DELETE, &format!("/{id}"))?;
        Ok(self.send(builder)?.is_some())
    }
}

/// Process-local store used in offline mode and tests. Keeps insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<MemoryRecord>>, UpstreamError> {
        self.records.lock().map_err(|e| UpstreamError::Failed {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

impl MemoryStore for InMemoryStore {
    fn add(&self, content: &str, metadata: Map<String, Value>) -> Result<MemoryRecord, UpstreamError> {
        let now = Utc::now();
        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.push(record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<Option<MemoryRecord>, UpstreamError> {
        Ok(self.lock()?.iter().find(|r| r.id == id).cloned())
    }

    fn list(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<MemoryRecord>, UpstreamError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| r.owner() == Some(user_id))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Option<MemoryRecord>, UpstreamError> {
        let mut records = self.lock()?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(content) = content {
            record.content = content;
        }
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    fn delete(&self, id: &str) -> Result<bool, UpstreamError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }
}
