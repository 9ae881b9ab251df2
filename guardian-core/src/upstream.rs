//! Upstream model dispatch.
//!
//! Supports OpenAI, Azure OpenAI, Ollama, vLLM, and any endpoint that
//! follows the OpenAI chat completions API format. The orchestrator only
//! sees the `UpstreamProvider` trait; tests swap in `MockUpstream`.

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// An upstream LLM endpoint. One call per prompt; the dual-call
/// orchestrator issues concurrent calls against the same provider.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Send a single prompt and return the assistant's text.
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// OpenAI-compatible upstream provider.
pub struct OpenAiCompatibleUpstream {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatibleUpstream {
    /// Create a provider from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Local endpoints (Ollama, vLLM, LM Studio)
    /// don't require a key; a dummy bearer token is used.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let is_local =
            config.base_url.contains("localhost") || config.base_url.contains("127.0.0.1");

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local upstream; using dummy bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| UpstreamError::AuthFailed {
                provider: format!("OpenAI-compatible: env var '{}' not set", config.api_key_env),
            })?;

        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Parse an OpenAI-format response body into the assistant text.
    fn parse_response(body: &Value) -> Result<String, UpstreamError> {
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| UpstreamError::ResponseParse {
                message: "No message content in response".to_string(),
            })?;
        Ok(content.to_string())
    }

    /// Map an HTTP status code to the appropriate UpstreamError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> UpstreamError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                UpstreamError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            status if status >= 500 => UpstreamError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => UpstreamError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl UpstreamProvider for OpenAiCompatibleUpstream {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        debug!(url = %url, model = %self.model, "Sending upstream completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    UpstreamError::ApiRequest {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| UpstreamError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| UpstreamError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json)
    }
}

/// In-process fake upstream for tests and local experimentation.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted behavior for a `MockUpstream` call.
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Respond with the given text after an optional delay.
        Respond {
            text: String,
            delay: Option<Duration>,
        },
        /// Fail with a timeout error after an optional delay.
        Timeout { delay: Option<Duration> },
        /// Fail with a generic request error.
        Fail { message: String },
    }

    /// A deterministic upstream that echoes scripted responses and counts
    /// how many calls it received.
    pub struct MockUpstream {
        behavior: MockBehavior,
        calls: AtomicUsize,
    }

    impl MockUpstream {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
            }
        }

        /// Convenience: respond immediately with `text`.
        pub fn responding(text: &str) -> Self {
            Self::new(MockBehavior::Respond {
                text: text.to_string(),
                delay: None,
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamProvider for MockUpstream {
        async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Respond { text, delay } => {
                    if let Some(d) = delay {
                        tokio::time::sleep(*d).await;
                    }
                    // Embed a prompt prefix so tests can tell which branch
                    // produced the response.
                    let prefix: String = prompt.chars().take(20).collect();
                    Ok(format!("{text} [re: {prefix}]"))
                }
                MockBehavior::Timeout { delay } => {
                    if let Some(d) = delay {
                        tokio::time::sleep(*d).await;
                    }
                    Err(UpstreamError::Timeout { timeout_secs: 0 })
                }
                MockBehavior::Fail { message } => Err(UpstreamError::ApiRequest {
                    message: message.clone(),
                }),
            }
        }
    }
}
