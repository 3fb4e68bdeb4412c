//! Provider output normalization.
//!
//! Providers return loosely structured text. [`normalize`] turns it into a
//! [`DomainResult`] or rejects it with `SchemaInvalid`, which the router
//! treats like any other provider failure. Nothing is coerced: a missing
//! required field fails the whole batch.
//!
//! # Mixed question types
//!
//! When the config asks for [`QuestionType::Mixed`] each item is classified
//! on its own, first rule wins:
//!
//! 1. no options, or a gap marker in the question text, is fill-in-the-gap;
//! 2. an answer that is a JSON array, a string holding a JSON array, or a
//!    string with list separators (`,` `;` `|`) that is not itself one of the
//!    options, is select-all;
//! 3. anything else is multiple choice.
//!
//! For every other question type the requested type is authoritative.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{
    ChatReply, DomainResult, GenerationConfig, LessonSection, Mode, ProtocolStep, QuestionKind,
    QuestionType, QuizQuestion, StudyProtocol, Summary,
};
use crate::{HuginnError, Result};

/// Substrings marking the gap in a fill-in-the-gap question.
pub const GAP_MARKERS: &[&str] = &["___", "[blank]", "{{gap}}"];

const LIST_SEPARATORS: &[char] = &[',', ';', '|'];

/// Parse raw provider output for `mode`.
pub fn normalize(mode: Mode, raw: &str, config: &GenerationConfig) -> Result<DomainResult> {
    match mode {
        Mode::Exam => normalize_exam(raw, config).map(DomainResult::Exam),
        Mode::Lesson => normalize_lesson(raw).map(DomainResult::Lesson),
        Mode::Protocol => normalize_protocol(raw, config).map(DomainResult::Protocol),
        Mode::Chat => normalize_text(raw).map(|text| {
            DomainResult::Chat(ChatReply {
                text,
                degraded: false,
            })
        }),
        Mode::Summary => normalize_text(raw).map(|text| {
            DomainResult::Summary(Summary {
                text,
                degraded: false,
            })
        }),
    }
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    #[serde(default)]
    options: Vec<String>,
    correct_answer: Value,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    title: String,
    content: String,
    #[serde(default)]
    analogy: Option<String>,
    #[serde(default)]
    key_points: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    title: String,
    description: String,
    #[serde(default)]
    duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawProtocol {
    title: String,
    steps: Vec<RawStep>,
    #[serde(default)]
    tips: Vec<String>,
}

/// Parse and validate a quiz batch.
pub fn normalize_exam(raw: &str, config: &GenerationConfig) -> Result<Vec<QuizQuestion>> {
    let items: Vec<RawQuestion> = parse_list(raw, "questions")?;
    let limit = config.effective_question_count() as usize;

    let mut questions = Vec::with_capacity(items.len().min(limit));
    for (item, id) in items.into_iter().take(limit).zip(1u32..) {
        questions.push(build_question(item, id, config.question_type)?);
    }
    if questions.is_empty() {
        return Err(HuginnError::SchemaInvalid("quiz contains no questions".into()));
    }
    Ok(questions)
}

/// Parse and validate lesson sections.
pub fn normalize_lesson(raw: &str) -> Result<Vec<LessonSection>> {
    let items: Vec<RawSection> = parse_list(raw, "sections")?;
    if items.is_empty() {
        return Err(HuginnError::SchemaInvalid("lesson contains no sections".into()));
    }
    items
        .into_iter()
        .zip(1u32..)
        .map(|(item, id)| {
            let title = required_text(item.title, "section title")?;
            let content = required_text(item.content, "section content")?;
            Ok(LessonSection {
                id,
                title,
                content,
                analogy: non_blank(item.analogy),
                key_points: clean_list(item.key_points),
            })
        })
        .collect()
}

/// Parse and validate a study protocol.
pub fn normalize_protocol(raw: &str, config: &GenerationConfig) -> Result<StudyProtocol> {
    let technique = config.technique.unwrap_or_default();
    let value = parse_json(raw)?;
    let protocol = match value {
        Value::Array(_) => RawProtocol {
            title: technique.display_name().to_string(),
            steps: serde_json::from_value(value).map_err(schema_error)?,
            tips: Vec::new(),
        },
        other => serde_json::from_value(other).map_err(schema_error)?,
    };
    if protocol.steps.is_empty() {
        return Err(HuginnError::SchemaInvalid("protocol contains no steps".into()));
    }

    let steps = protocol
        .steps
        .into_iter()
        .zip(1u32..)
        .map(|(step, id)| {
            Ok(ProtocolStep {
                id,
                title: required_text(step.title, "step title")?,
                description: required_text(step.description, "step description")?,
                duration_minutes: step.duration_minutes,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StudyProtocol {
        title: required_text(protocol.title, "protocol title")?,
        technique,
        steps,
        tips: clean_list(protocol.tips),
        degraded: false,
    })
}

/// Trimmed, non-empty free text.
pub fn normalize_text(raw: &str) -> Result<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(HuginnError::SchemaInvalid("provider returned empty text".into()));
    }
    Ok(text.to_string())
}

/// Decide the concrete format of one item.
pub fn classify_question(
    requested: QuestionType,
    question: &str,
    options: &[String],
    answer: &Value,
) -> QuestionKind {
    match requested {
        QuestionType::MultipleChoice => QuestionKind::MultipleChoice,
        QuestionType::FillInTheGap => QuestionKind::FillInTheGap,
        QuestionType::SelectAll => QuestionKind::SelectAll,
        QuestionType::Mixed => {
            if options.is_empty() || has_gap_marker(question) {
                QuestionKind::FillInTheGap
            } else if looks_like_answer_set(answer, options) {
                QuestionKind::SelectAll
            } else {
                QuestionKind::MultipleChoice
            }
        }
    }
}

fn has_gap_marker(question: &str) -> bool {
    let lower = question.to_lowercase();
    GAP_MARKERS.iter().any(|m| lower.contains(m))
}

fn looks_like_answer_set(answer: &Value, options: &[String]) -> bool {
    match answer {
        Value::Array(_) => true,
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with('[') && serde_json::from_str::<Vec<Value>>(s).is_ok() {
                return true;
            }
            s.contains(LIST_SEPARATORS) && match_option(s, options).is_none()
        }
        _ => false,
    }
}

fn build_question(item: RawQuestion, id: u32, requested: QuestionType) -> Result<QuizQuestion> {
    let question = required_text(item.question, "question text")?;
    let options = clean_list(item.options);
    let kind = classify_question(requested, &question, &options, &item.correct_answer);

    let correct_answer = match kind {
        QuestionKind::MultipleChoice => {
            if options.is_empty() {
                return Err(HuginnError::SchemaInvalid(format!(
                    "question {id}: multiple choice without options"
                )));
            }
            let answer = answer_string(&item.correct_answer, id)?;
            match_option(&answer, &options).ok_or_else(|| {
                HuginnError::SchemaInvalid(format!(
                    "question {id}: answer {answer:?} is not one of the options"
                ))
            })?
        }
        QuestionKind::FillInTheGap => required_text(answer_string(&item.correct_answer, id)?, "answer")?,
        QuestionKind::SelectAll => {
            if options.is_empty() {
                return Err(HuginnError::SchemaInvalid(format!(
                    "question {id}: select-all without options"
                )));
            }
            let answers = answer_set(&item.correct_answer, id)?
                .into_iter()
                .map(|a| {
                    match_option(&a, &options).ok_or_else(|| {
                        HuginnError::SchemaInvalid(format!(
                            "question {id}: answer {a:?} is not one of the options"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            serde_json::to_string(&answers)?
        }
    };

    Ok(QuizQuestion {
        id,
        kind,
        question,
        options,
        correct_answer,
        explanation: non_blank(item.explanation),
        topic: non_blank(item.topic),
    })
}

fn answer_string(answer: &Value, id: u32) -> Result<String> {
    match answer {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(HuginnError::SchemaInvalid(format!(
            "question {id}: correct_answer must be a string"
        ))),
    }
}

fn answer_set(answer: &Value, id: u32) -> Result<Vec<String>> {
    let items: Vec<String> = match answer {
        Value::Array(values) => values
            .iter()
            .map(|v| answer_string(v, id))
            .collect::<Result<_>>()?,
        Value::String(s) => {
            let s = s.trim();
            match serde_json::from_str::<Vec<String>>(s) {
                Ok(list) => list,
                Err(_) => s.split(LIST_SEPARATORS).map(str::to_string).collect(),
            }
        }
        _ => {
            return Err(HuginnError::SchemaInvalid(format!(
                "question {id}: correct_answer must be a list"
            )));
        }
    };
    let items = clean_list(items);
    if items.is_empty() {
        return Err(HuginnError::SchemaInvalid(format!(
            "question {id}: empty answer set"
        )));
    }
    Ok(items)
}

/// The option text equal to `answer`, compared trimmed and case-insensitively.
fn match_option(answer: &str, options: &[String]) -> Option<String> {
    let wanted = answer.trim().to_lowercase();
    options
        .iter()
        .find(|o| o.trim().to_lowercase() == wanted)
        .cloned()
}

/// Parse a list that may arrive bare or wrapped in an object under `field`.
fn parse_list<T: serde::de::DeserializeOwned>(raw: &str, field: &str) -> Result<Vec<T>> {
    let value = parse_json(raw)?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove(field).ok_or_else(|| {
            HuginnError::SchemaInvalid(format!("response object has no \"{field}\" field"))
        })?,
        _ => {
            return Err(HuginnError::SchemaInvalid(format!(
                "expected a list of {field}"
            )));
        }
    };
    serde_json::from_value(list).map_err(schema_error)
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(strip_code_fence(raw)).map_err(schema_error)
}

/// Remove a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn schema_error(err: serde_json::Error) -> HuginnError {
    HuginnError::SchemaInvalid(err.to_string())
}

fn required_text(text: String, what: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(HuginnError::SchemaInvalid(format!("{what} is empty")));
    }
    Ok(trimmed.to_string())
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mixed() -> GenerationConfig {
        GenerationConfig::new().question_type(QuestionType::Mixed)
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("  [2] "), "[2]");
    }

    #[test]
    fn mixed_classification_precedence() {
        let opts = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(
            classify_question(QuestionType::Mixed, "Water boils at ___ C", &opts, &json!("100")),
            QuestionKind::FillInTheGap
        );
        assert_eq!(
            classify_question(QuestionType::Mixed, "Name it", &[], &json!("x")),
            QuestionKind::FillInTheGap
        );
        assert_eq!(
            classify_question(QuestionType::Mixed, "Pick", &opts, &json!(["A", "B"])),
            QuestionKind::SelectAll
        );
        assert_eq!(
            classify_question(QuestionType::Mixed, "Pick", &opts, &json!("[\"A\",\"C\"]")),
            QuestionKind::SelectAll
        );
        assert_eq!(
            classify_question(QuestionType::Mixed, "Pick", &opts, &json!("A; C")),
            QuestionKind::SelectAll
        );
        assert_eq!(
            classify_question(QuestionType::Mixed, "Pick", &opts, &json!("B")),
            QuestionKind::MultipleChoice
        );
    }

    #[test]
    fn gap_marker_beats_array_answer() {
        let opts = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            classify_question(QuestionType::Mixed, "Fill [blank] in", &opts, &json!(["A", "B"])),
            QuestionKind::FillInTheGap
        );
    }

    #[test]
    fn option_containing_comma_stays_multiple_choice() {
        let opts = vec!["Paris, France".to_string(), "Rome".to_string()];
        assert_eq!(
            classify_question(QuestionType::Mixed, "Capital?", &opts, &json!("Paris, France")),
            QuestionKind::MultipleChoice
        );
    }

    #[test]
    fn requested_type_is_authoritative() {
        let opts = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            classify_question(QuestionType::MultipleChoice, "___", &opts, &json!(["A"])),
            QuestionKind::MultipleChoice
        );
    }

    #[test]
    fn exam_batch_gets_local_ids_and_is_truncated() {
        let raw = json!({
            "questions": [
                {"question": "Q1", "options": ["a", "b"], "correct_answer": "a"},
                {"question": "Q2", "options": ["a", "b"], "correct_answer": "b"},
                {"question": "Q3", "options": ["a", "b"], "correct_answer": "a"}
            ]
        })
        .to_string();
        let config = GenerationConfig::new().question_count(2);
        let questions = normalize_exam(&raw, &config).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, 1);
        assert_eq!(questions[1].id, 2);
        assert_eq!(questions[1].correct_answer, "b");
    }

    #[test]
    fn mixed_batch_normalizes_each_kind() {
        let raw = r#"```json
[
  {"question": "The powerhouse of the cell is the ___", "options": [], "correct_answer": "mitochondrion"},
  {"question": "Which are organelles?", "options": ["Nucleus", "Ribosome", "Plasma"], "correct_answer": ["nucleus", "Ribosome"]},
  {"question": "Cells divide by?", "options": ["Mitosis", "Osmosis"], "correct_answer": "mitosis", "explanation": "Basic biology"}
]
```"#;
        let questions = normalize_exam(raw, &mixed()).unwrap();
        assert_eq!(questions[0].kind, QuestionKind::FillInTheGap);
        assert_eq!(questions[1].kind, QuestionKind::SelectAll);
        assert_eq!(
            questions[1].correct_answers(),
            vec!["Nucleus".to_string(), "Ribosome".to_string()]
        );
        assert_eq!(questions[2].kind, QuestionKind::MultipleChoice);
        assert_eq!(questions[2].correct_answer, "Mitosis");
        assert_eq!(questions[2].explanation.as_deref(), Some("Basic biology"));
    }

    #[test]
    fn missing_required_field_fails_batch() {
        let raw = r#"[{"question": "Q1", "options": ["a"]}]"#;
        let err = normalize_exam(raw, &GenerationConfig::new()).unwrap_err();
        assert!(matches!(err, HuginnError::SchemaInvalid(_)));
    }

    #[test]
    fn answer_outside_options_is_invalid() {
        let raw = r#"[{"question": "Q1", "options": ["a", "b"], "correct_answer": "c"}]"#;
        assert!(normalize_exam(raw, &GenerationConfig::new()).is_err());
    }

    #[test]
    fn empty_and_garbage_results_are_invalid() {
        assert!(normalize_exam("[]", &GenerationConfig::new()).is_err());
        assert!(normalize_exam("{\"questions\": []}", &GenerationConfig::new()).is_err());
        assert!(normalize_exam("Sure! Here is your quiz", &GenerationConfig::new()).is_err());
        assert!(normalize_lesson("{\"sections\": []}").is_err());
        assert!(normalize_text("   ").is_err());
    }

    #[test]
    fn lesson_sections_are_numbered() {
        let raw = r#"{"sections": [
            {"title": "Light", "content": "Plants absorb light.", "key_points": ["chlorophyll", " "]},
            {"title": "Sugar", "content": "Glucose is made.", "analogy": "a bakery"}
        ]}"#;
        let sections = normalize_lesson(raw).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].id, 2);
        assert_eq!(sections[0].key_points, vec!["chlorophyll".to_string()]);
        assert_eq!(sections[1].analogy.as_deref(), Some("a bakery"));
    }

    #[test]
    fn protocol_accepts_object_or_bare_steps() {
        let config = GenerationConfig::new();
        let object = r#"{"title": "Plan", "steps": [{"title": "Read", "description": "Read it", "duration_minutes": 10}], "tips": ["sleep"]}"#;
        let protocol = normalize_protocol(object, &config).unwrap();
        assert_eq!(protocol.title, "Plan");
        assert_eq!(protocol.steps[0].duration_minutes, Some(10));
        assert!(!protocol.degraded);

        let bare = r#"[{"title": "Read", "description": "Read it"}]"#;
        let protocol = normalize_protocol(bare, &config).unwrap();
        assert_eq!(protocol.steps.len(), 1);
        assert!(normalize_protocol(r#"{"title": "Plan", "steps": []}"#, &config).is_err());
    }

    #[test]
    fn text_modes_trim() {
        let result = normalize(Mode::Summary, "  short summary \n", &GenerationConfig::new()).unwrap();
        assert_eq!(result.into_summary().unwrap().text, "short summary");
    }
}
