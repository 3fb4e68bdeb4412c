//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::facade::{Inner, StudyGateway};
use crate::cache::{CacheConfig, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::providers::{GeminiClient, GroqClient, InferenceProvider};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::router::{Router, RouterConfig};
use crate::sanitize::{ContentSanitizer, SanitizerConfig};
use crate::store::{KvStore, MemoryStore};
use crate::Result;

/// Main entry point for creating gateway instances.
pub struct Huginn;

impl Huginn {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// ```rust,no_run
/// # use huginn::{Huginn, FileStore};
/// # use std::sync::Arc;
/// # async fn run() -> huginn::Result<()> {
/// let gateway = Huginn::builder()
///     .groq(std::env::var("GROQ_API_KEY").unwrap_or_default())
///     .gemini(std::env::var("GEMINI_API_KEY").unwrap_or_default())
///     .store(Arc::new(FileStore::open_default().await?))
///     .build()?;
/// let summary = gateway.summarize("Photosynthesis converts light into chemical energy.").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct HuginnBuilder {
    groq_key: Option<String>,
    groq_model: Option<String>,
    groq_base_url: Option<String>,
    gemini_key: Option<String>,
    gemini_model: Option<String>,
    gemini_base_url: Option<String>,
    fast_provider: Option<Arc<dyn InferenceProvider>>,
    multimodal_provider: Option<Arc<dyn InferenceProvider>>,
    store: Option<Arc<dyn KvStore>>,
    clock: Option<Arc<dyn Clock>>,
    rate_limit: RateLimitConfig,
    cache: CacheConfig,
    router: RouterConfig,
    sanitizer: SanitizerConfig,
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the Groq fast text provider. An empty key leaves it unconfigured.
    pub fn groq(mut self, api_key: impl Into<String>) -> Self {
        self.groq_key = Some(api_key.into());
        self
    }

    /// Override the Groq model.
    pub fn groq_model(mut self, model: impl Into<String>) -> Self {
        self.groq_model = Some(model.into());
        self
    }

    /// Override the Groq base URL (for proxies or wiremock).
    pub fn groq_base_url(mut self, url: impl Into<String>) -> Self {
        self.groq_base_url = Some(url.into());
        self
    }

    /// Configure the Gemini multimodal provider. An empty key leaves it unconfigured.
    pub fn gemini(mut self, api_key: impl Into<String>) -> Self {
        self.gemini_key = Some(api_key.into());
        self
    }

    /// Override the Gemini model.
    pub fn gemini_model(mut self, model: impl Into<String>) -> Self {
        self.gemini_model = Some(model.into());
        self
    }

    /// Override the Gemini base URL (for proxies or wiremock).
    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.gemini_base_url = Some(url.into());
        self
    }

    /// Use a custom provider in the fast text slot (replaces Groq).
    pub fn fast_provider(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.fast_provider = Some(provider);
        self
    }

    /// Use a custom provider in the multimodal slot (replaces Gemini).
    pub fn multimodal_provider(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.multimodal_provider = Some(provider);
        self
    }

    /// Persist rate and cache state here (default: in-memory, lost on exit).
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source (default: system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn sanitizer(mut self, config: SanitizerConfig) -> Self {
        self.sanitizer = config;
        self
    }

    /// Per-call provider timeout (default: 60s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.router.request_timeout = timeout;
        self
    }

    /// Text length above which the large-context provider goes first.
    pub fn large_context_threshold(mut self, chars: usize) -> Self {
        self.router.large_context_threshold_chars = chars;
        self
    }

    /// Build the gateway.
    ///
    /// Fails with `NoProvider` when neither slot ends up configured.
    pub fn build(self) -> Result<StudyGateway> {
        let fast = match self.fast_provider {
            Some(provider) => Some(provider),
            None => match present(self.groq_key) {
                Some(key) => {
                    let mut client = match self.groq_base_url {
                        Some(url) => GroqClient::with_base_url(key, url)?,
                        None => GroqClient::new(key)?,
                    };
                    if let Some(model) = self.groq_model {
                        client = client.with_model(model);
                    }
                    Some(Arc::new(client) as Arc<dyn InferenceProvider>)
                }
                None => None,
            },
        };

        let multimodal = match self.multimodal_provider {
            Some(provider) => Some(provider),
            None => match present(self.gemini_key) {
                Some(key) => {
                    let mut client = match self.gemini_base_url {
                        Some(url) => GeminiClient::with_base_url(key, url)?,
                        None => GeminiClient::new(key)?,
                    };
                    if let Some(model) = self.gemini_model {
                        client = client.with_model(model);
                    }
                    Some(Arc::new(client) as Arc<dyn InferenceProvider>)
                }
                None => None,
            },
        };

        info!(
            fast = ?fast.as_ref().map(|p| p.name()),
            multimodal = ?multimodal.as_ref().map(|p| p.name()),
            "building gateway"
        );
        let router = Router::new(fast, multimodal, self.router)?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KvStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        Ok(StudyGateway::new(Inner {
            router,
            limiter: RateLimiter::with_clock(self.rate_limit, store.clone(), clock.clone()),
            cache: ResponseCache::with_clock(self.cache, store, clock),
            sanitizer: ContentSanitizer::with_config(self.sanitizer),
        }))
    }
}

fn present(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.trim().is_empty())
}
