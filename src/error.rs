//! Huginn error types

use std::time::Duration;

use crate::types::Mode;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Admission errors
    /// The local token bucket is empty. Nothing was sent upstream.
    #[error("rate budget exhausted, retry after {retry_after:?}")]
    RateExceeded { retry_after: Duration },

    /// Internal cache lookup outcome; never surfaced by the gateway facade.
    #[error("cache miss")]
    CacheMiss,

    // Provider/network errors
    /// Credential missing, connection refused, transport failure or timeout.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Non-2xx answer carrying a provider-supplied reason.
    #[error("provider {provider} rejected request ({status}): {message}")]
    ProviderRejected {
        provider: String,
        status: u16,
        message: String,
    },

    // Data errors
    /// Provider output was unparseable or missing required fields.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Outcome errors
    /// Every eligible provider failed for a mode that needs a definitive result.
    #[error("{mode} generation failed: {reason}")]
    GenerationFailed { mode: Mode, reason: String },

    /// A static placeholder stood in for a real result.
    #[error("{0} result is a degraded placeholder")]
    Degraded(Mode),

    /// The background task producing a result went away.
    #[error("generation task cancelled")]
    Cancelled,

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl HuginnError {
    /// Whether the router may retry this failure once on the other provider.
    ///
    /// Transport failures, provider rejections and unusable output all
    /// qualify. Programming errors (`InvalidInput`) and admission errors do not.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            HuginnError::ProviderUnavailable(_)
                | HuginnError::ProviderRejected { .. }
                | HuginnError::SchemaInvalid(_)
                | HuginnError::Json(_)
        )
    }

    /// Whether the caller should simply try again later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HuginnError::RateExceeded { .. })
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HuginnError::ProviderUnavailable(format!("timed out: {err}"))
        } else if err.is_decode() {
            HuginnError::SchemaInvalid(err.to_string())
        } else {
            HuginnError::ProviderUnavailable(err.to_string())
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
