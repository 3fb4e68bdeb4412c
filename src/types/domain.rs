//! Domain records produced by the gateway

use serde::{Deserialize, Serialize};

use super::request::{Mode, StudyTechnique};
use crate::{HuginnError, Result};

/// Concrete format of a single quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    FillInTheGap,
    SelectAll,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::FillInTheGap => "fill_in_the_gap",
            QuestionKind::SelectAll => "select_all",
        }
    }
}

/// A quiz item.
///
/// `options` is non-empty unless `kind` is [`QuestionKind::FillInTheGap`].
/// For [`QuestionKind::SelectAll`] the `correct_answer` is a serialized JSON
/// array of option strings; use [`correct_answers`](Self::correct_answers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// Position within its generation batch, starting at 1.
    pub id: u32,
    pub kind: QuestionKind,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl QuizQuestion {
    /// The set of correct answers.
    ///
    /// Decodes the serialized set for select-all questions; a single-element
    /// list otherwise.
    pub fn correct_answers(&self) -> Vec<String> {
        match self.kind {
            QuestionKind::SelectAll => serde_json::from_str(&self.correct_answer)
                .unwrap_or_else(|_| vec![self.correct_answer.clone()]),
            _ => vec![self.correct_answer.clone()],
        }
    }

    /// Grade a submitted answer.
    ///
    /// Fill-in-the-gap compares case-insensitively after trimming; select-all
    /// compares as sets.
    pub fn is_correct(&self, submitted: &[&str]) -> bool {
        match self.kind {
            QuestionKind::MultipleChoice => {
                submitted.len() == 1 && submitted[0].trim() == self.correct_answer
            }
            QuestionKind::FillInTheGap => {
                submitted.len() == 1
                    && submitted[0].trim().to_lowercase()
                        == self.correct_answer.trim().to_lowercase()
            }
            QuestionKind::SelectAll => {
                let mut expected = self.correct_answers();
                let mut given: Vec<String> =
                    submitted.iter().map(|s| s.trim().to_string()).collect();
                expected.sort();
                expected.dedup();
                given.sort();
                given.dedup();
                expected == given
            }
        }
    }
}

/// One section of a generated lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSection {
    pub id: u32,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analogy: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// A tutor reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    /// `true` when this is a static placeholder, not a generated reply.
    #[serde(default)]
    pub degraded: bool,
}

impl ChatReply {
    /// The reply text, or `Degraded` if it is only a placeholder.
    pub fn into_text(self) -> Result<String> {
        if self.degraded {
            Err(HuginnError::Degraded(Mode::Chat))
        } else {
            Ok(self.text)
        }
    }
}

/// A generated summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    #[serde(default)]
    pub degraded: bool,
}

impl Summary {
    /// The summary text, or `Degraded` if it is only a placeholder.
    pub fn into_text(self) -> Result<String> {
        if self.degraded {
            Err(HuginnError::Degraded(Mode::Summary))
        } else {
            Ok(self.text)
        }
    }
}

/// One step of a study protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub id: u32,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

/// A study plan built around one technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyProtocol {
    pub title: String,
    pub technique: StudyTechnique,
    pub steps: Vec<ProtocolStep>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

/// Any normalized gateway output.
///
/// This is also the cached payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "result", rename_all = "lowercase")]
pub enum DomainResult {
    Exam(Vec<QuizQuestion>),
    Lesson(Vec<LessonSection>),
    Chat(ChatReply),
    Protocol(StudyProtocol),
    Summary(Summary),
}

impl DomainResult {
    pub fn mode(&self) -> Mode {
        match self {
            DomainResult::Exam(_) => Mode::Exam,
            DomainResult::Lesson(_) => Mode::Lesson,
            DomainResult::Chat(_) => Mode::Chat,
            DomainResult::Protocol(_) => Mode::Protocol,
            DomainResult::Summary(_) => Mode::Summary,
        }
    }

    /// Whether this result is a static placeholder.
    pub fn is_degraded(&self) -> bool {
        match self {
            DomainResult::Chat(reply) => reply.degraded,
            DomainResult::Summary(summary) => summary.degraded,
            DomainResult::Protocol(protocol) => protocol.degraded,
            DomainResult::Exam(_) | DomainResult::Lesson(_) => false,
        }
    }

    pub fn into_exam(self) -> Result<Vec<QuizQuestion>> {
        match self {
            DomainResult::Exam(questions) => Ok(questions),
            other => Err(mode_mismatch(Mode::Exam, other.mode())),
        }
    }

    pub fn into_lesson(self) -> Result<Vec<LessonSection>> {
        match self {
            DomainResult::Lesson(sections) => Ok(sections),
            other => Err(mode_mismatch(Mode::Lesson, other.mode())),
        }
    }

    pub fn into_chat(self) -> Result<ChatReply> {
        match self {
            DomainResult::Chat(reply) => Ok(reply),
            other => Err(mode_mismatch(Mode::Chat, other.mode())),
        }
    }

    pub fn into_protocol(self) -> Result<StudyProtocol> {
        match self {
            DomainResult::Protocol(protocol) => Ok(protocol),
            other => Err(mode_mismatch(Mode::Protocol, other.mode())),
        }
    }

    pub fn into_summary(self) -> Result<Summary> {
        match self {
            DomainResult::Summary(summary) => Ok(summary),
            other => Err(mode_mismatch(Mode::Summary, other.mode())),
        }
    }
}

fn mode_mismatch(expected: Mode, actual: Mode) -> HuginnError {
    HuginnError::SchemaInvalid(format!("expected {expected} result, got {actual}"))
}
