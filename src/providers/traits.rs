//! The provider seam.
//!
//! The router only sees [`InferenceProvider`]: a name for logs and metrics,
//! a static [`ProviderCapabilities`] descriptor, and one generation call.
//! Concrete clients map their own transport failures onto the shared error
//! taxonomy so the router can decide on fallback without knowing who failed:
//!
//! - unreachable, timed out, missing credentials: `ProviderUnavailable`
//! - non-2xx answers: `ProviderRejected`
//! - a 2xx answer without usable text: `SchemaInvalid`

use async_trait::async_trait;

use crate::Result;
use crate::multimodal::ProviderPayload;
use crate::types::ProviderCapabilities;

/// An upstream inference backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for logging and metric labels.
    fn name(&self) -> &str;

    /// What this provider accepts.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Run one generation and return the raw text output.
    async fn generate(&self, payload: &ProviderPayload) -> Result<String>;
}
