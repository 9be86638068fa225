//! Structured value extraction through an OpenAI-compatible chat endpoint.

pub mod parse;
pub mod retry;
pub mod transport;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::sanitize::clip;
pub use retry::RetryPolicy;
pub use transport::{CompletionTransport, HttpResponse, ReqwestTransport, TransportError};
pub use types::{LabReport, Measurement};

pub const SYSTEM_PROMPT: &str = "You are a JSON extractor. Return valid JSON only.";

const QUOTA_CODE: &str = "insufficient_quota";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The account ran out of credit; retrying cannot help.
    QuotaExhausted,
    /// Rate limit, server error or transport failure.
    Transient,
    Permanent,
    MalformedResponse,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ExtractionServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
    /// HTTP status, when the upstream answered at all.
    pub status: Option<u16>,
}

impl ExtractionServiceError {
    fn new(kind: ServiceErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ServiceErrorKind::Transient
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint base, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub retry: RetryPolicy,
    /// Return [`canned_result`] without any network traffic.
    pub offline: bool,
    pub offline_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            retry: RetryPolicy::default(),
            offline: false,
            offline_delay: Duration::from_millis(5000),
        }
    }
}

/// Result returned in offline mode.
pub fn canned_result() -> LabReport {
    LabReport {
        patient_name: Some("[REDACTED]".to_string()),
        blood_sugar: Some(Measurement::new(95.0, "mg/dL", "Normal")),
        cholesterol: Some(Measurement::new(210.0, "mg/dL", "High")),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn build_prompt(text: &str) -> String {
    format!(
        "Extract the patient name, blood sugar and cholesterol from the lab report below.\n\
         Respond with a single JSON object of this shape, using null for anything not present:\n\
         {}\n\nLab report:\n\"\"\"\n{}\n\"\"\"",
        LabReport::SCHEMA_HINT,
        text
    )
}

/// Maps a non-2xx response onto an error kind.
///
/// Quota exhaustion is recognized only through the `insufficient_quota`
/// code or type; services without that convention get `Permanent` for
/// their non-retryable statuses.
pub fn classify_failure(response: &HttpResponse) -> ExtractionServiceError {
    let status = response.status;
    let error = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|v| v.get("error").cloned());

    let field = |name: &str| {
        error
            .as_ref()
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let code = field("code");
    let error_type = field("type");
    let detail = field("message").unwrap_or_else(|| clip(response.body.trim(), 200));

    if code.as_deref() == Some(QUOTA_CODE) || error_type.as_deref() == Some(QUOTA_CODE) {
        return ExtractionServiceError::new(
            ServiceErrorKind::QuotaExhausted,
            format!("Upstream quota exhausted: {}", detail),
            Some(status),
        );
    }

    let kind = if status == 429 || (500..600).contains(&status) {
        ServiceErrorKind::Transient
    } else {
        ServiceErrorKind::Permanent
    };
    ExtractionServiceError::new(
        kind,
        format!("Upstream request failed with status {}: {}", status, detail),
        Some(status),
    )
}

/// Pulls the model's reply out of a completion body and parses it.
pub fn parse_completion(body: &str) -> Result<LabReport, ExtractionServiceError> {
    let malformed =
        |message: String| ExtractionServiceError::new(ServiceErrorKind::MalformedResponse, message, None);

    let value: Value = serde_json::from_str(body)
        .map_err(|e| malformed(format!("Upstream response is not JSON: {}", e)))?;
    let choice = value.get("choices").and_then(|c| c.get(0));
    let content = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| choice.and_then(|c| c.get("text")).and_then(Value::as_str))
        .ok_or_else(|| malformed("Upstream response has no message content".to_string()))?;

    parse::parse_json_lenient::<LabReport>(content).ok_or_else(|| {
        malformed(format!(
            "Model output is not valid JSON: {}",
            clip(content.trim(), 200)
        ))
    })
}

pub struct ExtractionClient {
    transport: Arc<dyn CompletionTransport>,
    config: ClientConfig,
}

impl ExtractionClient {
    pub fn new(transport: Arc<dyn CompletionTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_offline(&self) -> bool {
        self.config.offline
    }

    /// Extracts structured values from already-redacted text.
    pub async fn extract(&self, redacted_text: &str) -> Result<LabReport, ExtractionServiceError> {
        if self.config.offline {
            log::info!(
                "Offline mode: returning canned result after {:?}",
                self.config.offline_delay
            );
            tokio::time::sleep(self.config.offline_delay).await;
            return Ok(canned_result());
        }

        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ExtractionServiceError::new(
                ServiceErrorKind::Permanent,
                "No API key configured for the extraction service",
                None,
            )
        })?;

        let prompt = build_prompt(redacted_text);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };
        let body = serde_json::to_value(&request).map_err(|e| {
            ExtractionServiceError::new(ServiceErrorKind::Permanent, e.to_string(), None)
        })?;
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            let err = match self.transport.post_json(&url, api_key, &body).await {
                Ok(response) if response.is_success() => {
                    log::debug!("Extraction succeeded on attempt {}", attempt + 1);
                    return parse_completion(&response.body);
                }
                Ok(response) => classify_failure(&response),
                Err(e) => ExtractionServiceError::new(
                    ServiceErrorKind::Transient,
                    format!("Upstream request failed: {}", e),
                    None,
                ),
            };

            if !err.is_retryable() || !policy.has_next(attempt) {
                log::error!(
                    "Extraction failed after {} attempt(s) ({:?}): {}",
                    attempt + 1,
                    err.kind,
                    err
                );
                return Err(err);
            }

            let delay = policy.delay_for(attempt);
            log::warn!(
                "Extraction attempt {} failed ({}), retrying in {:?}",
                attempt + 1,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
