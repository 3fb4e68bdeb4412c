//! Generation requests and their per-mode configuration

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of quiz questions when the caller does not specify one.
pub const DEFAULT_QUESTION_COUNT: u32 = 5;

/// Upper bound on quiz questions per batch.
pub const MAX_QUESTION_COUNT: u32 = 50;

/// Kind of learning artifact being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Exam,
    Lesson,
    Chat,
    Protocol,
    Summary,
}

impl Mode {
    /// Stable lowercase name, used for metric labels and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Exam => "exam",
            Mode::Lesson => "lesson",
            Mode::Chat => "chat",
            Mode::Protocol => "protocol",
            Mode::Summary => "summary",
        }
    }

    /// Whether a static placeholder is an acceptable answer when every
    /// provider failed. Learning artifacts must never be silently wrong.
    pub fn tolerates_degradation(&self) -> bool {
        matches!(self, Mode::Chat | Mode::Summary | Mode::Protocol)
    }

    /// Whether the mode asks for structured JSON output.
    pub fn expects_json(&self) -> bool {
        matches!(self, Mode::Exam | Mode::Lesson | Mode::Protocol)
    }

    /// Whether the mode prefers the large-context provider regardless of input size.
    pub fn prefers_large_context(&self) -> bool {
        matches!(self, Mode::Lesson)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quiz difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Requested quiz question format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    MultipleChoice,
    FillInTheGap,
    SelectAll,
    /// Several formats in one batch, resolved per item at normalization time.
    Mixed,
}

/// Study technique a protocol is built around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyTechnique {
    Feynman,
    #[default]
    ActiveRecall,
    SpacedRepetition,
    Pomodoro,
    Leitner,
}

impl StudyTechnique {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyTechnique::Feynman => "feynman",
            StudyTechnique::ActiveRecall => "active_recall",
            StudyTechnique::SpacedRepetition => "spaced_repetition",
            StudyTechnique::Pomodoro => "pomodoro",
            StudyTechnique::Leitner => "leitner",
        }
    }

    /// Human-readable name used in prompts and placeholders.
    pub fn display_name(&self) -> &'static str {
        match self {
            StudyTechnique::Feynman => "Feynman Technique",
            StudyTechnique::ActiveRecall => "Active Recall",
            StudyTechnique::SpacedRepetition => "Spaced Repetition",
            StudyTechnique::Pomodoro => "Pomodoro",
            StudyTechnique::Leitner => "Leitner System",
        }
    }
}

/// Generation options (mode-agnostic; each mode reads the fields it needs).
///
/// The whole struct participates in the cache fingerprint, so two requests
/// differing in any option never share a cached answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analogy_domain: Option<String>,
    /// Include explanations and hints with every item.
    #[serde(default)]
    pub oracle: bool,
    /// Bias generation toward the learner's weak topics.
    #[serde(default)]
    pub weakness_focus: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technique: Option<StudyTechnique>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn question_count(mut self, count: u32) -> Self {
        self.question_count = Some(count);
        self
    }

    pub fn question_type(mut self, question_type: QuestionType) -> Self {
        self.question_type = question_type;
        self
    }

    pub fn timer_secs(mut self, secs: u32) -> Self {
        self.timer_secs = Some(secs);
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn analogy_domain(mut self, domain: impl Into<String>) -> Self {
        self.analogy_domain = Some(domain.into());
        self
    }

    pub fn oracle(mut self, enabled: bool) -> Self {
        self.oracle = enabled;
        self
    }

    pub fn weakness_focus(mut self, enabled: bool) -> Self {
        self.weakness_focus = enabled;
        self
    }

    pub fn technique(mut self, technique: StudyTechnique) -> Self {
        self.technique = Some(technique);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Requested question count, defaulted and clamped to `1..=MAX_QUESTION_COUNT`.
    pub fn effective_question_count(&self) -> u32 {
        self.question_count
            .unwrap_or(DEFAULT_QUESTION_COUNT)
            .clamp(1, MAX_QUESTION_COUNT)
    }

    /// Output language, English unless configured.
    pub fn effective_language(&self) -> &str {
        self.language.as_deref().unwrap_or("English")
    }
}

/// What the gateway knows about the learner when generating an exam.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    #[serde(default)]
    pub weak_topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl LearnerProfile {
    pub fn with_weak_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            weak_topics: topics.into_iter().map(Into::into).collect(),
            level: None,
        }
    }
}

/// One immutable unit of work for the gateway.
///
/// `content` is the raw text stream and may carry inline image markers
/// (see [`multimodal`](crate::multimodal)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    mode: Mode,
    content: String,
    config: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<LearnerProfile>,
}

impl GenerationRequest {
    pub fn new(mode: Mode, content: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            mode,
            content: content.into(),
            config,
            profile: None,
        }
    }

    /// Attach a learner profile (only consulted for exams).
    pub fn with_profile(mut self, profile: LearnerProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn profile(&self) -> Option<&LearnerProfile> {
        self.profile.as_ref()
    }

    /// Profile data that actually influences the output.
    ///
    /// Weak topics only matter when `weakness_focus` is on, so they are
    /// dropped otherwise to keep unrelated requests sharing cache entries.
    pub fn effective_profile(&self) -> Option<&LearnerProfile> {
        match (self.mode, self.config.weakness_focus) {
            (Mode::Exam, true) => self.profile.as_ref(),
            _ => None,
        }
    }
}
