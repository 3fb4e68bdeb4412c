//! Public types for the Huginn API.

mod capabilities;
mod domain;
mod message;
mod request;

pub use capabilities::{Capabilities, Modality, ProviderCapabilities};
pub use domain::{
    ChatReply, DomainResult, LessonSection, ProtocolStep, QuestionKind, QuizQuestion,
    StudyProtocol, Summary,
};
pub use message::{ChatRole, ChatTurn};
pub use request::{
    DEFAULT_QUESTION_COUNT, Difficulty, GenerationConfig, GenerationRequest, LearnerProfile,
    MAX_QUESTION_COUNT, Mode, QuestionType, StudyTechnique,
};
