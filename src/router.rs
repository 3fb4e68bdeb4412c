//! Provider selection and the single-fallback policy.
//!
//! Each dispatch walks a small state machine:
//!
//! ```text
//! SELECT_PROVIDER ─► CALL_PRIMARY ─┬─► SUCCESS
//!                                  └─► CALL_SECONDARY ─┬─► SUCCESS
//!                                                      └─► FAILED
//! ```
//!
//! # Selection
//!
//! Requests carrying images, requests in modes that need lesson-scale
//! reasoning, and text longer than the large-context threshold go to the
//! multimodal provider first. Everything else goes to the fast text
//! provider first. A missing preferred provider promotes the other one.
//!
//! # Fallback
//!
//! A primary failure that [`is_fallback_trigger`](HuginnError::is_fallback_trigger)
//! (unreachable, rejected, timed out, or output the normalizer refused)
//! gets exactly one attempt on the other provider, provided it is configured
//! and accepts the content. There are no same-provider retries and no
//! backoff. When both attempts fail the dispatch ends in `GenerationFailed`;
//! the gateway decides whether the mode may degrade to a placeholder.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::multimodal::ProviderPayload;
use crate::providers::InferenceProvider;
use crate::telemetry;
use crate::types::{Capabilities, Mode, ProviderCapabilities};
use crate::{HuginnError, Result};

/// Default per-call bound on provider latency.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default text length above which the large-context provider is preferred.
pub const DEFAULT_LARGE_CONTEXT_THRESHOLD: usize = 30_000;

/// Router tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Upper bound on a single provider call. Default: 60s.
    pub request_timeout: Duration,
    /// Characters of text above which the large-context provider goes first.
    pub large_context_threshold_chars: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            large_context_threshold_chars: DEFAULT_LARGE_CONTEXT_THRESHOLD,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn large_context_threshold_chars(mut self, chars: usize) -> Self {
        self.large_context_threshold_chars = chars;
        self
    }
}

/// The request facts that drive provider choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHints {
    pub mode: Mode,
    pub has_images: bool,
    pub text_chars: usize,
}

/// Ordered providers for one dispatch.
#[derive(Clone)]
pub struct RoutePlan {
    pub primary: Arc<dyn InferenceProvider>,
    pub secondary: Option<Arc<dyn InferenceProvider>>,
}

impl std::fmt::Debug for RoutePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePlan")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|p| p.name()))
            .finish()
    }
}

/// Chooses providers and runs the fallback policy.
pub struct Router {
    fast: Option<Arc<dyn InferenceProvider>>,
    multimodal: Option<Arc<dyn InferenceProvider>>,
    config: RouterConfig,
}

impl Router {
    /// Create a router over the configured providers.
    ///
    /// At least one provider is required.
    pub fn new(
        fast: Option<Arc<dyn InferenceProvider>>,
        multimodal: Option<Arc<dyn InferenceProvider>>,
        config: RouterConfig,
    ) -> Result<Self> {
        if fast.is_none() && multimodal.is_none() {
            return Err(HuginnError::NoProvider);
        }
        Ok(Self {
            fast,
            multimodal,
            config,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// What the configured providers can do together.
    pub fn capabilities(&self) -> Capabilities {
        let caps: Vec<ProviderCapabilities> = self
            .providers()
            .map(|p| p.capabilities())
            .collect();
        Capabilities {
            fast_text: self.fast.is_some(),
            multimodal: caps.iter().any(|c| c.is_multimodal()),
            large_context: caps.iter().any(|c| c.supports_large_context),
            fallback: self.providers().count() > 1,
        }
    }

    /// Whether a request should start on the large-context provider.
    pub fn prefers_large_context(&self, hints: &RouteHints) -> bool {
        hints.has_images
            || hints.mode.prefers_large_context()
            || hints.text_chars > self.config.large_context_threshold_chars
    }

    /// Order the providers able to serve `hints`.
    ///
    /// Returns `None` when no configured provider accepts the content, e.g.
    /// images with only a text-only provider configured.
    pub fn plan(&self, hints: &RouteHints) -> Option<RoutePlan> {
        let (preferred, other) = if self.prefers_large_context(hints) {
            (&self.multimodal, &self.fast)
        } else {
            (&self.fast, &self.multimodal)
        };

        let mut eligible = [preferred, other]
            .into_iter()
            .flatten()
            .filter(|p| p.capabilities().accepts(hints.has_images))
            .cloned();

        let primary = eligible.next()?;
        let secondary = eligible.find(|p| !Arc::ptr_eq(p, &primary));
        Some(RoutePlan { primary, secondary })
    }

    /// Whether any configured provider accepts the content described by `hints`.
    pub fn is_routable(&self, hints: &RouteHints) -> bool {
        self.plan(hints).is_some()
    }

    /// Run one request through primary and, if needed, secondary provider.
    ///
    /// `build` shapes the payload for a provider's capabilities and `parse`
    /// normalizes its raw output; a `SchemaInvalid` from `parse` counts as a
    /// provider failure. `InvalidInput` from either closure aborts at once.
    #[instrument(skip(self, build, parse), fields(mode = %hints.mode, images = hints.has_images))]
    pub async fn dispatch<T, B, P>(&self, hints: RouteHints, build: B, parse: P) -> Result<T>
    where
        B: Fn(&ProviderCapabilities) -> Result<ProviderPayload> + Send + Sync,
        P: Fn(&str) -> Result<T> + Send + Sync,
        T: Send,
    {
        let mode = hints.mode;
        let Some(plan) = self.plan(&hints) else {
            return Err(no_route(mode));
        };
        debug!(?plan, "route selected");

        let primary_err = match self.attempt(&plan.primary, mode, &build, &parse).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fallback_trigger() => e,
            Err(e) => return Err(e),
        };
        warn!(provider = plan.primary.name(), error = %primary_err, "primary provider failed");

        let Some(secondary) = plan.secondary else {
            return Err(HuginnError::GenerationFailed {
                mode,
                reason: format!("{}: {primary_err}", plan.primary.name()),
            });
        };

        metrics::counter!(telemetry::FALLBACKS_TOTAL,
            "from" => plan.primary.name().to_owned(),
            "to" => secondary.name().to_owned(),
            "mode" => mode.as_str(),
        )
        .increment(1);

        match self.attempt(&secondary, mode, &build, &parse).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_fallback_trigger() => {
                warn!(provider = secondary.name(), error = %e, "fallback provider failed");
                Err(HuginnError::GenerationFailed {
                    mode,
                    reason: format!(
                        "{}: {primary_err}; {}: {e}",
                        plan.primary.name(),
                        secondary.name()
                    ),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt<T, B, P>(
        &self,
        provider: &Arc<dyn InferenceProvider>,
        mode: Mode,
        build: &B,
        parse: &P,
    ) -> Result<T>
    where
        B: Fn(&ProviderCapabilities) -> Result<ProviderPayload>,
        P: Fn(&str) -> Result<T>,
    {
        let payload = build(&provider.capabilities())?;
        let start = Instant::now();
        let timeout = self.config.request_timeout;

        let outcome = match tokio::time::timeout(timeout, provider.generate(&payload)).await {
            Ok(Ok(raw)) => parse(&raw),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HuginnError::ProviderUnavailable(format!(
                "{} timed out after {timeout:?}",
                provider.name()
            ))),
        };
        Self::record_request(mode, provider.name(), start, outcome.is_ok());
        outcome
    }

    fn providers(&self) -> impl Iterator<Item = &Arc<dyn InferenceProvider>> {
        self.fast.iter().chain(self.multimodal.iter())
    }

    fn record_request(mode: Mode, provider: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "mode" => mode.as_str(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.to_owned(),
            "mode" => mode.as_str(),
        )
        .record(elapsed);
    }
}

/// Failure for a request no configured provider can accept.
pub fn no_route(mode: Mode) -> HuginnError {
    HuginnError::GenerationFailed {
        mode,
        reason: "no configured provider accepts image content".into(),
    }
}

