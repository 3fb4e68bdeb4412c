//! Inference provider clients.
//!
//! Two HTTP clients implement [`InferenceProvider`]:
//! - [`GroqClient`] — fast, text-only (OpenAI-compatible chat completions)
//! - [`GeminiClient`] — multimodal, large-context (`generateContent`)
//!
//! Embedders may plug in their own implementations through the gateway
//! builder.

use std::time::Duration;

use serde::Deserialize;

use crate::HuginnError;

pub mod gemini;
pub mod groq;
pub mod traits;

pub use gemini::GeminiClient;
pub use groq::GroqClient;
pub use traits::InferenceProvider;

/// Transport-level timeout for provider HTTP clients.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-2xx response to `ProviderRejected`, keeping the provider's
/// own message when the body carries one.
pub(crate) async fn rejection(provider: &str, response: reqwest::Response) -> HuginnError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.chars().take(512).collect()
            }
        });

    HuginnError::ProviderRejected {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    }
}
