//! Generative Model Client
//!
//! A unified interface over the LLM providers used for finding enrichment
//! and summary generation: OpenAI, Anthropic Claude, and Ollama for local
//! models. The pipeline only depends on the `GenerativeClient` trait so
//! enrichment degrades gracefully when no provider is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    /// OpenAI GPT models
    OpenAI,
    /// Anthropic Claude models
    Anthropic,
    /// Ollama local models
    Ollama,
}

/// Provider configuration for the generative client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Provider to talk to
    pub provider: LLMProvider,
    /// API key, unused for local providers
    pub api_key: Option<String>,
    /// Base URL for API requests
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f64,
    /// Request timeout
    pub timeout_seconds: u64,
}

impl Default for LLMProviderConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Ollama,
            api_key: None,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_seconds: 30,
        }
    }
}

/// Completion boundary used by enrichment and summary generation
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Complete a prompt and return the generated text
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String>;

    /// Version string recorded in snapshots
    fn model_version(&self) -> String;
}

/// HTTP-backed generative client
pub struct HttpGenerativeClient {
    config: LLMProviderConfig,
    client: reqwest::Client,
}

impl HttpGenerativeClient {
    /// Create a client for the given provider configuration
    pub fn new(config: LLMProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerativeClient {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        debug!(
            "Sending completion request to {:?} model {}",
            self.config.provider, self.config.model
        );

        match self.config.provider {
            LLMProvider::OpenAI => {
                let body = json!({
                    "model": self.config.model,
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": prompt },
                    ],
                    "max_tokens": self.config.max_tokens,
                    "temperature": self.config.temperature,
                });
                let response: serde_json::Value = self
                    .client
                    .post(format!("{}/chat/completions", self.config.base_url))
                    .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                response["choices"][0]["message"]["content"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("empty completion from OpenAI"))
            }
            LLMProvider::Anthropic => {
                let body = json!({
                    "model": self.config.model,
                    "max_tokens": self.config.max_tokens,
                    "temperature": self.config.temperature,
                    "system": system,
                    "messages": [{ "role": "user", "content": prompt }],
                });
                let response: serde_json::Value = self
                    .client
                    .post(format!("{}/v1/messages", self.config.base_url))
                    .header(
                        "x-api-key",
                        self.config.api_key.as_deref().unwrap_or_default(),
                    )
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                response["content"][0]["text"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("empty completion from Anthropic"))
            }
            LLMProvider::Ollama => {
                let body = json!({
                    "model": self.config.model,
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": prompt },
                    ],
                    "stream": false,
                    "options": { "temperature": self.config.temperature },
                });
                let response: serde_json::Value = self
                    .client
                    .post(format!("{}/api/chat", self.config.base_url))
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                response["message"]["content"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("empty completion from Ollama"))
            }
        }
    }

    fn model_version(&self) -> String {
        format!("{:?}/{}", self.config.provider, self.config.model)
    }
}
