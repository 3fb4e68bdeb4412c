//! StudyGateway - the single entry point for generation

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use super::task::GenerationTask;
use crate::cache::{CacheKey, ResponseCache};
use crate::multimodal;
use crate::normalize;
use crate::prompts;
use crate::rate_limit::{RateLimiter, RateStatus};
use crate::router::{self, RouteHints, Router};
use crate::sanitize::ContentSanitizer;
use crate::telemetry;
use crate::types::{
    Capabilities, ChatReply, ChatTurn, DomainResult, GenerationConfig, GenerationRequest,
    LearnerProfile, LessonSection, Mode, QuizQuestion, StudyProtocol, StudyTechnique, Summary,
};
use crate::{HuginnError, Result};

/// Rate-limited, cached gateway turning study material into learning artifacts.
///
/// Cheap to clone; clones share the limiter, cache and providers.
///
/// Every operation runs the same pipeline:
///
/// ```text
/// split images ─► sanitize ─► cache lookup ──hit──► return
///                                  │ miss
///                                  ▼
///                 rate admission ─► router (primary, one fallback)
///                                  │
///                                  ▼
///                 normalize ─► cache store ─► return
/// ```
///
/// A cache hit consumes no rate budget and makes no provider call. A rate
/// rejection makes no provider call.
#[derive(Clone)]
pub struct StudyGateway {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) router: Router,
    pub(crate) limiter: RateLimiter,
    pub(crate) cache: ResponseCache,
    pub(crate) sanitizer: ContentSanitizer,
}

impl StudyGateway {
    pub(crate) fn new(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Generate quiz questions from study material.
    ///
    /// `profile` is only consulted when `config.weakness_focus` is set.
    pub async fn generate_exam(
        &self,
        content: &str,
        config: GenerationConfig,
        profile: Option<LearnerProfile>,
    ) -> Result<Vec<QuizQuestion>> {
        self.generate(exam_request(content, config, profile))
            .await?
            .into_exam()
    }

    /// Generate a structured lesson from study material.
    pub async fn generate_lesson(
        &self,
        content: &str,
        config: GenerationConfig,
    ) -> Result<Vec<LessonSection>> {
        self.generate(GenerationRequest::new(Mode::Lesson, content, config))
            .await?
            .into_lesson()
    }

    /// Answer the newest message of a tutoring session.
    ///
    /// May return a degraded placeholder (`degraded == true`) when no
    /// provider could answer.
    pub async fn generate_chat_reply(
        &self,
        history: &[ChatTurn],
        file_context: &str,
        new_message: &str,
    ) -> Result<ChatReply> {
        if new_message.trim().is_empty() {
            return Err(HuginnError::InvalidInput("chat message is empty".into()));
        }
        let content = prompts::chat_transcript(history, file_context, new_message);
        self.generate(GenerationRequest::new(
            Mode::Chat,
            content,
            GenerationConfig::default(),
        ))
        .await?
        .into_chat()
    }

    /// Build a study protocol around `technique`.
    ///
    /// May return a generic degraded protocol when no provider could answer.
    pub async fn generate_study_protocol(
        &self,
        content: &str,
        technique: StudyTechnique,
    ) -> Result<StudyProtocol> {
        let config = GenerationConfig::new().technique(technique);
        self.generate(GenerationRequest::new(Mode::Protocol, content, config))
            .await?
            .into_protocol()
    }

    /// Summarize study material.
    ///
    /// May return a degraded placeholder when no provider could answer.
    pub async fn summarize(&self, content: &str) -> Result<Summary> {
        self.generate(GenerationRequest::new(
            Mode::Summary,
            content,
            GenerationConfig::default(),
        ))
        .await?
        .into_summary()
    }

    /// Run any request through the pipeline.
    #[instrument(skip(self, request), fields(mode = %request.mode()))]
    pub async fn generate(&self, request: GenerationRequest) -> Result<DomainResult> {
        self.inner.generate(&request).await
    }

    /// Start an exam generation in the background.
    pub fn spawn_exam(
        &self,
        content: &str,
        config: GenerationConfig,
        profile: Option<LearnerProfile>,
    ) -> GenerationTask<Vec<QuizQuestion>> {
        self.spawn_with(exam_request(content, config, profile), DomainResult::into_exam)
    }

    /// Start any generation in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, request: GenerationRequest) -> GenerationTask<DomainResult> {
        self.spawn_with(request, Ok)
    }

    fn spawn_with<T, F>(&self, request: GenerationRequest, extract: F) -> GenerationTask<T>
    where
        T: Send + 'static,
        F: FnOnce(DomainResult) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = inner.generate(&request).await.and_then(extract);
            if tx.send(result).is_err() {
                debug!(mode = %request.mode(), "background result abandoned");
            }
        });
        GenerationTask::new(rx)
    }

    /// Current rate budget, without consuming a token.
    pub async fn rate_status(&self) -> Result<RateStatus> {
        self.inner.limiter.status().await
    }

    /// Number of cached results.
    pub async fn cache_len(&self) -> usize {
        self.inner.cache.len().await
    }

    /// Drop every cached result.
    pub async fn clear_cache(&self) {
        self.inner.cache.clear().await
    }

    /// What the configured providers can do.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.router.capabilities()
    }
}

impl Inner {
    async fn generate(&self, request: &GenerationRequest) -> Result<DomainResult> {
        let mode = request.mode();
        let split = multimodal::split(request.content())?;
        if split.text.is_empty() && !split.has_images() {
            return Err(HuginnError::InvalidInput("content is empty".into()));
        }

        let sanitized = self.sanitizer.sanitize(&split.text);
        let key = CacheKey::derive(
            request,
            sanitized.as_str(),
            &split.images,
            self.cache.config().signature,
        );

        if let Some(hit) = self.cache.get(mode, &key).await {
            debug!(%key, "served from cache");
            return Ok(hit);
        }

        let hints = RouteHints {
            mode,
            has_images: split.has_images(),
            text_chars: sanitized.as_str().chars().count(),
        };

        // unservable content is a configuration failure and costs no token
        let outcome = if self.router.is_routable(&hints) {
            self.limiter.admit().await?;

            let preamble = prompts::preamble(request, &self.sanitizer);
            let user = prompts::user_prompt(mode, &self.sanitizer.wrap(&sanitized));
            let options = prompts::payload_options(mode);
            self.router
                .dispatch(
                    hints,
                    |caps| {
                        multimodal::build_payload(
                            caps,
                            &user,
                            &split.images,
                            &preamble,
                            options.clone(),
                        )
                    },
                    |raw| normalize::normalize(mode, raw, request.config()),
                )
                .await
        } else {
            Err(router::no_route(mode))
        };

        match outcome {
            Ok(result) => {
                self.cache.put(&key, result.clone()).await;
                info!(%key, "generated");
                Ok(result)
            }
            Err(HuginnError::GenerationFailed { reason, .. }) if mode.tolerates_degradation() => {
                let Some(placeholder) = prompts::placeholder(request) else {
                    return Err(HuginnError::GenerationFailed { mode, reason });
                };
                warn!(%reason, "all providers failed, returning placeholder");
                metrics::counter!(telemetry::DEGRADED_TOTAL, "mode" => mode.as_str()).increment(1);
                Ok(placeholder)
            }
            Err(e) => Err(e),
        }
    }
}

fn exam_request(
    content: &str,
    config: GenerationConfig,
    profile: Option<LearnerProfile>,
) -> GenerationRequest {
    let request = GenerationRequest::new(Mode::Exam, content, config);
    match profile {
        Some(profile) => request.with_profile(profile),
        None => request,
    }
}
