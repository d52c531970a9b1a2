use std::time::Duration;

use async_trait::async_trait;
use corvid_core::{AnalystConfig, CodeChunk, CorvidError, Finding, FocusArea};

use crate::prompt;

/// Why one analysis invocation failed.
///
/// Transient failures (network timeouts, rate-limit signals, provider 5xx)
/// are retried by the dispatcher; permanent failures are recorded once.
///
/// # Examples
///
/// ```
/// use corvid_review::analyst::AnalysisError;
///
/// assert!(AnalysisError::Transient("429".into()).is_retryable());
/// assert!(!AnalysisError::Permanent("bad request".into()).is_retryable());
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// Worth retrying: timeout, rate limit, provider-side failure.
    #[error("transient analysis failure: {0}")]
    Transient(String),

    /// Not worth retrying: malformed request or capability-reported error.
    #[error("permanent analysis failure: {0}")]
    Permanent(String),
}

impl AnalysisError {
    /// Whether the dispatcher should retry after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Transient(_))
    }
}

/// The opaque analysis capability: one chunk, one focus, findings out.
///
/// The production implementation is [`HttpAnalyst`]; tests inject
/// deterministic stubs through this seam.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Analyze `chunk` through the lens of `focus`.
    async fn analyze(
        &self,
        chunk: &CodeChunk,
        focus: FocusArea,
    ) -> Result<Vec<Finding>, AnalysisError>;

    /// Model identifier, for run statistics.
    fn model(&self) -> &str;
}

/// OpenAI-compatible chat completions analyst.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc. The per-task deadline is enforced by
/// the dispatcher; the HTTP client carries a wider safety timeout only.
///
/// # Examples
///
/// ```
/// use corvid_core::AnalystConfig;
/// use corvid_review::analyst::HttpAnalyst;
///
/// let config = AnalystConfig {
///     api_key: Some("test-key".into()),
///     ..AnalystConfig::default()
/// };
/// let analyst = HttpAnalyst::new(&config).unwrap();
/// ```
pub struct HttpAnalyst {
    client: reqwest::Client,
    config: AnalystConfig,
}

impl HttpAnalyst {
    /// Create a new analyst from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CorvidError::Analysis`] if the HTTP client cannot be built.
    pub fn new(config: &AnalystConfig) -> Result<Self, CorvidError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| CorvidError::Analysis(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn chat(&self, system: String, user: String) -> Result<String, AnalysisError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com");
        let url = format!("{base_url}/v1/chat/completions");

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        let response = request.json(&body).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                AnalysisError::Transient(format!("request failed: {e}"))
            } else {
                AnalysisError::Permanent(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("analysis API error {status}: {body_text}");
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(AnalysisError::Transient(message))
            } else {
                Err(AnalysisError::Permanent(message))
            };
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Permanent(format!("failed to parse response: {e}")))?;

        let content = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                AnalysisError::Permanent(format!("unexpected response structure: {response_body}"))
            })?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl Analyst for HttpAnalyst {
    async fn analyze(
        &self,
        chunk: &CodeChunk,
        focus: FocusArea,
    ) -> Result<Vec<Finding>, AnalysisError> {
        let system = prompt::system_prompt(focus);
        let user = prompt::chunk_prompt(chunk);
        let response = self.chat(system, user).await?;
        prompt::parse_findings(&response, chunk, focus).map_err(AnalysisError::Permanent)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
