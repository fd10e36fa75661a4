use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---- auth ----

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `/auth/token` accepts the OAuth2 password form (`username`, `password`) or the same
/// fields as JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

// ---- document analysis ----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysisRequest {
    /// Base64 payloads, optionally as `data:<mime>;base64,<payload>` URLs. Only the first
    /// is analyzed.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysisResponse<T> {
    pub success: bool,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerDebug {
    pub endpoint_set: bool,
    pub endpoint_length: usize,
    pub key_set: bool,
    pub key_length: usize,
    pub model_id: String,
    pub credentials_valid: bool,
}

// ---- financial statements ----

#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_base64: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub statement_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseResponse {
    pub id: String,
    pub file_name: String,
    pub parsed_data: Value,
}

// ---- chat ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub usage: Value,
}

// ---- memory ----

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryCreate {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

// ---- business graph ----

#[derive(Debug, Clone, Deserialize)]
pub struct EntityCreate {
    pub entity_type: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipCreate {
    pub from_type: String,
    pub from_id: String,
    pub to_type: String,
    pub to_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQuery {
    pub query: String,
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
}
