//! OpenAI-compatible chat completion client.
//!
//! Works with OpenAI, Groq, DeepSeek, Ollama, vLLM, LM Studio, and any
//! endpoint that follows the chat completions API format.

use async_trait::async_trait;
use quarry_core::CapabilityError;
use quarry_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::http;

const NAME: &str = "llm";

/// One system + user prompt exchange.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// `None` uses the client's configured temperature.
    pub temperature: Option<f32>,
    pub max_tokens: usize,
}

impl<'a> ChatRequest<'a> {
    pub fn new(system: &'a str, user: &'a str) -> Self {
        Self {
            system,
            user,
            temperature: None,
            max_tokens: 1500,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A text-completion backend used by the LLM-backed stages.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, CapabilityError>;
}

pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl OpenAiCompatClient {
    /// Create a client for the top-level endpoint in `config`.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Local endpoints do not need one.
    pub fn new(config: &LlmConfig, user_agent: &str) -> Result<Self, CapabilityError> {
        Self::for_provider(&config.default_provider(), config, user_agent)
    }

    /// Create a client for one named provider, sharing `config`'s timeout
    /// and default temperature.
    pub fn for_provider(
        provider: &LlmProvider,
        config: &LlmConfig,
        user_agent: &str,
    ) -> Result<Self, CapabilityError> {
        let is_local =
            provider.base_url.contains("localhost") || provider.base_url.contains("127.0.0.1");
        let env_var = provider.api_key_env.as_deref().unwrap_or_default();
        let api_key = provider
            .api_key_env
            .as_deref()
            .and_then(crate::engines::read_key)
            .or_else(|| {
                if is_local || provider.api_key_env.is_none() {
                    debug!("No API key needed; using dummy bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| CapabilityError::NotConfigured {
                name: NAME.to_string(),
                reason: format!("environment variable {} is not set", env_var),
            })?;
        Self::build(provider, config, user_agent, api_key)
    }

    /// Create a client for the top-level endpoint with an explicit API key.
    pub fn with_key(
        config: &LlmConfig,
        user_agent: &str,
        api_key: String,
    ) -> Result<Self, CapabilityError> {
        Self::build(&config.default_provider(), config, user_agent, api_key)
    }

    fn build(
        provider: &LlmProvider,
        config: &LlmConfig,
        user_agent: &str,
        api_key: String,
    ) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: http::client(user_agent, Duration::from_secs(config.timeout_secs))?,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: provider.model.clone(),
            temperature: config.temperature,
            max_tokens: provider.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &ChatRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "stream": false,
        })
    }
}

/// Extract the first choice's message text.
pub fn parse_completion(body: &Value) -> Result<String, CapabilityError> {
    body.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| CapabilityError::Parse {
            name: NAME.to_string(),
            message: "No message content in response".to_string(),
        })
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, CapabilityError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(url = %url, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(NAME, e))?;

        let json = http::json_body(NAME, response).await?;
        parse_completion(&json)
    }
}
