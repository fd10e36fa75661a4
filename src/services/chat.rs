use crate::config::ChatConfig;
use crate::error::UpstreamError;
use crate::services::{check_status, http_client, require};
use crate::types::{ChatMessage, ChatRequest, ChatResponse};
use serde_json::{json, Value};
use std::time::Duration;

const SERVICE: &str = "chat";

pub trait ChatProvider: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, UpstreamError>;
}

/// OpenAI-compatible `/v1/chat/completions`.
pub struct OpenAiChat {
    config: ChatConfig,
}

impl OpenAiChat {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }
}

/// First choice's message plus the usage block (`{}` when absent).
fn parse_completion(body: &Value) -> Result<ChatResponse, UpstreamError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| UpstreamError::InvalidResponse {
            service: SERVICE,
            message: "no choices in completion".to_string(),
        })?;
    Ok(ChatResponse {
        message: ChatMessage {
            role: message
                .get("role")
                .and_then(|r| r.as_str())
                .unwrap_or("assistant")
                .to_string(),
            content: message
                .get("content")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        usage: body.get("usage").cloned().unwrap_or_else(|| json!({})),
    })
}

impl ChatProvider for OpenAiChat {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, UpstreamError> {
        let key = require(SERVICE, "OPENAI_API_KEY", &self.config.api_key)?;
        let client = http_client(SERVICE, Duration::from_secs(120))?;
        let response = client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(key)
            .json(&json!({
                "model": self.config.model,
                "messages": request.messages,
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
            }))
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        let body: Value = check_status(SERVICE, response)?
            .json()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        parse_completion(&body)
    }
}
