//! Gemini client: the multimodal, large-context provider.
//!
//! Uses the `generateContent` REST endpoint with inline image data and,
//! for structured modes, a response schema.
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::traits::InferenceProvider;
use super::{HTTP_TIMEOUT, rejection};
use crate::multimodal::{ContentPart, ProviderPayload};
use crate::types::ProviderCapabilities;
use crate::{HuginnError, Result};

/// Default base URL for the Gemini API
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Client for Gemini `generateContent`.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a client for the public Gemini API.
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

    fn build_request(payload: &ProviderPayload) -> GenerateRequest {
        let parts = payload
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => Part::Text { text: text.clone() },
                ContentPart::Image(image) => Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: image.to_base64(),
                    },
                },
            })
            .collect();

        let json_mode = payload.options.json_mode;
        GenerateRequest {
            system_instruction: (!payload.system_prompt.is_empty()).then(|| SystemInstruction {
                parts: vec![Part::Text {
                    text: payload.system_prompt.clone(),
                }],
            }),
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: payload.options.temperature,
                max_output_tokens: payload.options.max_tokens,
                response_mime_type: json_mode.then_some("application/json"),
                response_schema: if json_mode {
                    payload.options.response_schema.clone()
                } else {
                    None
                },
            },
        }
    }

    async fn generate_content(&self, payload: &ProviderPayload) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(HuginnError::ProviderUnavailable("gemini API key not set".into()));
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug!(
            model = %self.model,
            images = payload.images().count(),
            json = payload.options.json_mode,
            "gemini request"
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_request(payload))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection("gemini", response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| HuginnError::SchemaInvalid(format!("gemini response: {e}")))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = body
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked: {r}"))
                .unwrap_or_else(|| "gemini returned no content".to_string());
            return Err(HuginnError::SchemaInvalid(reason));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::multimodal()
    }

    async fn generate(&self, payload: &ProviderPayload) -> Result<String> {
        self.generate_content(payload).await
    }
}
