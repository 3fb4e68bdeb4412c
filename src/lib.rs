//! Huginn - Rate-limited, cached inference gateway for study material
//!
//! Turns untrusted study content (text with optional embedded images) into
//! structured learning artifacts: quizzes, lessons, tutoring replies, study
//! protocols and summaries. Content is sanitized against prompt injection,
//! admitted through a persisted token bucket, answered from a local response
//! cache when possible and otherwise routed to a fast text provider (Groq) or
//! a multimodal provider (Gemini), with a single fallback between them.
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{GenerationConfig, Huginn, QuestionType};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let gateway = Huginn::builder()
//!         .groq("gsk-your-key")
//!         .gemini("your-gemini-key")
//!         .build()?;
//!
//!     let config = GenerationConfig::new()
//!         .question_count(5)
//!         .question_type(QuestionType::MultipleChoice);
//!     let quiz = gateway
//!         .generate_exam("Photosynthesis converts light into chemical energy.", config, None)
//!         .await?;
//!
//!     for question in quiz {
//!         println!("{}. {}", question.id, question.question);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Persistence
//!
//! The rate bucket and response cache live in a [`KvStore`]. The builder
//! defaults to an in-memory store; pass a [`FileStore`] to keep both across
//! restarts:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn run() -> huginn::Result<()> {
//! use huginn::{CacheConfig, FileStore, Huginn, RateLimitConfig};
//! use std::time::Duration;
//!
//! let gateway = Huginn::builder()
//!     .groq("gsk-your-key")
//!     .store(Arc::new(FileStore::open_default().await?))
//!     .rate_limit(RateLimitConfig::new().capacity(10))
//!     .cache(CacheConfig::new().ttl(Duration::from_secs(3600)))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod multimodal;
pub mod normalize;
pub mod prompts;
pub mod providers;
pub mod rate_limit;
pub mod router;
pub mod sanitize;
pub mod store;
pub mod telemetry;
pub mod types;

/// Crate version, for `--version` output and diagnostics.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types at crate root
pub use error::{HuginnError, Result};
pub use gateway::{GenerationTask, Huginn, HuginnBuilder, StudyGateway};

pub use cache::{CacheConfig, CacheKey, ResponseCache, SignatureMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Secrets};
pub use multimodal::{ContentPart, ImagePart, PayloadOptions, ProviderPayload};
pub use providers::{GeminiClient, GroqClient, InferenceProvider};
pub use rate_limit::{RateLimitConfig, RateLimiter, RateStatus};
pub use router::RouterConfig;
pub use sanitize::{ContentSanitizer, Sanitized, SanitizerConfig};
pub use store::{FileStore, KvStore, MemoryStore};

// Re-export all types
pub use types::{
    Capabilities, ChatReply, ChatRole, ChatTurn, DEFAULT_QUESTION_COUNT, Difficulty, DomainResult,
    GenerationConfig, GenerationRequest, LearnerProfile, LessonSection, MAX_QUESTION_COUNT, Modality,
    Mode, ProtocolStep, ProviderCapabilities, QuestionKind, QuestionType, QuizQuestion,
    StudyProtocol, StudyTechnique, Summary,
};
