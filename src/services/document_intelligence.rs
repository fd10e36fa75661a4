use crate::config::DocumentIntelligenceConfig;
use crate::error::UpstreamError;
use crate::services::{check_status, http_client, require};
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "document intelligence";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Submits a document and returns the service's raw `analyzeResult` object.
pub trait DocumentAnalyzer: Send + Sync {
    fn analyze(&self, bytes: Vec<u8>) -> Result<Value, UpstreamError>;

    /// Endpoint and key are both present.
    fn is_configured(&self) -> bool;
}

/// Azure Document Intelligence REST client: POST the bytes to `:analyze`, then poll the
/// `Operation-Location` URL until the operation settles.
pub struct AzureDocumentIntelligence {
    config: DocumentIntelligenceConfig,
}

impl AzureDocumentIntelligence {
    pub fn new(config: DocumentIntelligenceConfig) -> Self {
        Self { config }
    }

    fn analyze_url(&self, endpoint: &str) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
            endpoint, self.config.model_id, self.config.api_version
        )
    }
}

enum PollOutcome {
    Done(Value),
    Pending,
}

/// Interpret one poll body: `succeeded` carries `analyzeResult`, `failed` carries
/// `error.message`, anything else (`notStarted`, `running`) means keep polling.
fn poll_outcome(body: Value) -> Result<PollOutcome, UpstreamError> {
    match body.get("status").and_then(|s| s.as_str()).unwrap_or("") {
        "succeeded" => match body.get("analyzeResult") {
            Some(result) => Ok(PollOutcome::Done(result.clone())),
            None => Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                message: "succeeded without analyzeResult".to_string(),
            }),
        },
        "failed" => {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            Err(UpstreamError::Failed {
                service: SERVICE,
                message: message.to_string(),
            })
        }
        _ => Ok(PollOutcome::Pending),
    }
}

impl DocumentAnalyzer for AzureDocumentIntelligence {
    fn analyze(&self, bytes: Vec<u8>) -> Result<Value, UpstreamError> {
        let endpoint = require(SERVICE, "DI_ENDPOINT", &self.config.endpoint)?;
        let key = require(SERVICE, "DI_KEY", &self.config.key)?;
        let url = self.analyze_url(endpoint);
        let client = http_client(SERVICE, REQUEST_TIMEOUT)?;

        tracing::info!(model = %self.config.model_id, bytes = bytes.len(), "submitting document");
        let response = client
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        let response = check_status(SERVICE, response)?;

        let operation_url = response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UpstreamError::InvalidResponse {
                service: SERVICE,
                message: "no Operation-Location in response".to_string(),
            })?
            .to_string();

        for attempt in 1..=self.config.poll_attempts {
            std::thread::sleep(self.config.poll_interval);
            let poll = client
                .get(&operation_url)
                .header("Ocp-Apim-Subscription-Key", key)
                .send()
                .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
            let body: Value = check_status(SERVICE, poll)?
                .json()
                .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
            match poll_outcome(body)? {
                PollOutcome::Done(result) => {
                    tracing::info!(attempt, "analysis succeeded");
                    return Ok(result);
                }
                PollOutcome::Pending => tracing::debug!(attempt, "analysis still running"),
            }
        }
        Err(UpstreamError::Timeout { service: SERVICE })
    }

    fn is_configured(&self) -> bool {
        self.config.endpoint.is_some() && self.config.key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(endpoint: Option<&str>, key: Option<&str>) -> DocumentIntelligenceConfig {
        DocumentIntelligenceConfig {
            endpoint: endpoint.map(String::from),
            key: key.map(String::from),
            model_id: "prebuilt-layout".into(),
            api_version: "2024-11-30".into(),
            poll_interval: Duration::from_millis(1),
            poll_attempts: 1,
            degraded_mode: false,
        }
    }

    #[test]
    fn analyze_url_includes_model_and_version() {
        let di = AzureDocumentIntelligence::new(config(Some("https://x"), Some("k")));
        assert_eq!(
            di.analyze_url("https://x"),
            "https://x/documentintelligence/documentModels/prebuilt-layout:analyze?api-version=2024-11-30"
        );
    }

    #[test]
    fn missing_credentials_fail_before_any_request() {
        let di = AzureDocumentIntelligence::new(config(Some("https://x"), None));
        assert!(!di.is_configured());
        let err = di.analyze(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured { missing: "DI_KEY", .. }));
    }

    #[test]
    fn poll_outcomes() {
        let done = poll_outcome(json!({"status": "succeeded", "analyzeResult": {"content": "x"}}));
        assert!(matches!(done, Ok(PollOutcome::Done(v)) if v["content"] == "x"));

        let running = poll_outcome(json!({"status": "running"}));
        assert!(matches!(running, Ok(PollOutcome::Pending)));

        let failed = poll_outcome(json!({"status": "failed", "error": {"message": "bad file"}}));
        assert!(matches!(failed, Err(UpstreamError::Failed { message, .. }) if message == "bad file"));

        let hollow = poll_outcome(json!({"status": "succeeded"}));
        assert!(matches!(hollow, Err(UpstreamError::InvalidResponse { .. })));
    }
}
