//! Groq client: the fast, text-only provider.
//!
//! Groq exposes an OpenAI-compatible chat completions endpoint.
//! See: <https://console.groq.com/docs/api-reference#chat-create>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::InferenceProvider;
use super::{HTTP_TIMEOUT, rejection};
use crate::multimodal::ProviderPayload;
use crate::types::ProviderCapabilities;
use crate::{HuginnError, Result};

/// Default base URL for the Groq API
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com";

/// Default model
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Client for Groq chat completions.
#[derive(Clone)]
pub struct GroqClient {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
}

impl GroqClient {
    /// Create a client for the public Groq API.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the transport timeout (the router applies its own bound too).
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, payload: &ProviderPayload) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(HuginnError::ProviderUnavailable("groq API key not set".into()));
        }
        if payload.has_images() {
            return Err(HuginnError::InvalidInput(
                "groq does not accept image content".into(),
            ));
        }

        let user = payload.text();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &payload.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: payload.options.temperature,
            max_tokens: payload.options.max_tokens,
            response_format: payload
                .options
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/openai/v1/chat/completions", self.base_url);
        debug!(model = %self.model, json = payload.options.json_mode, "groq request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection("groq", response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| HuginnError::SchemaInvalid(format!("groq response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| HuginnError::SchemaInvalid("groq returned no content".into()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceProvider for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::text_only()
    }

    async fn generate(&self, payload: &ProviderPayload) -> Result<String> {
        self.complete(payload).await
    }
}
