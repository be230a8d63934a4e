//! Validation of raw chat-completion responses into domain content.
//!
//! The model is asked for JSON but routinely wraps it in code fences, adds
//! stray fields, or gets the schema slightly wrong. Everything here is
//! tolerant where the result is still usable and strict where it is not:
//! malformed quiz items are dropped one by one; a course with no usable
//! question at all is rejected.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::domain::{AnswerEvaluation, CourseContent, Difficulty, OpenQuestion, QuizQuestion, EVALUATION_MAX_SCORE};
use crate::util::strip_code_fences;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidReason {
  #[error("API response has no message content")]
  MalformedResponse,

  #[error("model output is not valid JSON: {0}")]
  Json(String),

  #[error("model output has the wrong shape")]
  WrongShape,

  #[error("'questions' is not an array")]
  QuestionsNotArray,

  #[error("no valid questions in model output")]
  NoValidQuestions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
  Valid(CourseContent),
  Invalid(InvalidReason),
}

/// `choices[0].message.content` with code fences stripped.
pub fn extract_content(raw: &Value) -> Result<String, InvalidReason> {
  let first = raw
    .get("choices")
    .and_then(Value::as_array)
    .and_then(|c| c.first())
    .ok_or(InvalidReason::MalformedResponse)?;
  let content = first
    .pointer("/message/content")
    .and_then(Value::as_str)
    .ok_or(InvalidReason::MalformedResponse)?;
  Ok(strip_code_fences(content))
}

fn parse_json(content: &str) -> Result<Value, InvalidReason> {
  serde_json::from_str(content).map_err(|e| InvalidReason::Json(e.to_string()))
}

pub fn validate_course(raw: &Value, topic: &str, difficulty: Difficulty) -> Validation {
  match course_from_raw(raw, topic, difficulty) {
    Ok(c) => Validation::Valid(c),
    Err(r) => Validation::Invalid(r),
  }
}

fn course_from_raw(raw: &Value, topic: &str, difficulty: Difficulty) -> Result<CourseContent, InvalidReason> {
  let parsed = parse_json(&extract_content(raw)?)?;
  let obj = parsed.as_object().ok_or(InvalidReason::WrongShape)?;

  let theory = match obj.get("theory").ok_or(InvalidReason::WrongShape)? {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  };

  let items = obj.get("questions").and_then(Value::as_array).ok_or(InvalidReason::QuestionsNotArray)?;
  let questions: Vec<QuizQuestion> = items.iter().filter_map(validate_question).collect();
  if questions.len() < items.len() {
    debug!(target: "course", kept = questions.len(), total = items.len(), "Dropped malformed questions");
  }
  if questions.is_empty() {
    return Err(InvalidReason::NoValidQuestions);
  }

  let mut meta = match obj.get("meta") {
    Some(Value::Object(m)) => m.clone(),
    _ => Map::new(),
  };
  meta.insert("topic".into(), Value::String(topic.to_string()));
  meta.insert("difficulty".into(), Value::String(difficulty.as_str().to_string()));

  Ok(CourseContent { theory, questions, meta, error: None })
}

/// A quiz item survives only with a non-empty question, exactly four string
/// options and an integer answer index within them.
pub fn validate_question(v: &Value) -> Option<QuizQuestion> {
  let obj = v.as_object()?;
  let question = obj.get("question")?.as_str()?.trim();
  if question.is_empty() {
    return None;
  }
  let opts = obj.get("options")?.as_array()?;
  if opts.len() != 4 {
    return None;
  }
  let mut options: [String; 4] = Default::default();
  for (slot, o) in options.iter_mut().zip(opts) {
    *slot = o.as_str()?.to_string();
  }
  let answer = obj.get("answer")?.as_u64().filter(|a| *a <= 3)?;
  Some(QuizQuestion { question: question.to_string(), options, answer: answer as u8 })
}

/// Open questions from a JSON array, or an object holding a `questions` array.
pub fn parse_open_questions(content: &str) -> Result<Vec<OpenQuestion>, InvalidReason> {
  let parsed = parse_json(&strip_code_fences(content))?;
  let items = match &parsed {
    Value::Array(a) => a,
    Value::Object(o) => o.get("questions").and_then(Value::as_array).ok_or(InvalidReason::QuestionsNotArray)?,
    _ => return Err(InvalidReason::WrongShape),
  };
  Ok(items.iter().filter_map(open_question).collect())
}

fn open_question(v: &Value) -> Option<OpenQuestion> {
  let (question, notes) = match v {
    Value::String(s) => (s.as_str(), None),
    Value::Object(o) => (
      o.get("question")?.as_str()?,
      o.get("notes").and_then(Value::as_str).map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
    ),
    _ => return None,
  };
  let question = question.trim();
  (!question.is_empty()).then(|| OpenQuestion { question: question.to_string(), notes })
}

/// Grade object `{score, commentary, suggested_improvements}`; the score is
/// rounded and clamped into `0..=10`.
pub fn parse_evaluation(content: &str) -> Result<AnswerEvaluation, InvalidReason> {
  let parsed = parse_json(&strip_code_fences(content))?;
  let obj = parsed.as_object().ok_or(InvalidReason::WrongShape)?;
  let score = obj.get("score").and_then(Value::as_f64).ok_or(InvalidReason::WrongShape)?;
  let score = score.round().clamp(0.0, EVALUATION_MAX_SCORE as f64) as u8;

  let text = |k: &str| obj.get(k).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
  Ok(AnswerEvaluation {
    score,
    max_score: EVALUATION_MAX_SCORE,
    commentary: text("commentary").unwrap_or_default(),
    suggested_improvements: text("suggested_improvements"),
  })
}

/// Topic titles from a JSON array of strings, or `{"topics": [...]}`.
/// Trimmed, distinct, non-empty, at most `n`.
pub fn parse_topics(content: &str, n: usize) -> Result<Vec<String>, InvalidReason> {
  let parsed = parse_json(&strip_code_fences(content))?;
  let items = match &parsed {
    Value::Array(a) => a,
    Value::Object(o) => o.get("topics").and_then(Value::as_array).ok_or(InvalidReason::WrongShape)?,
    _ => return Err(InvalidReason::WrongShape),
  };
  let mut out: Vec<String> = Vec::new();
  for t in items.iter().filter_map(Value::as_str).map(str::trim) {
    if out.len() >= n {
      break;
    }
    if !t.is_empty() && !out.iter().any(|o| o == t) {
      out.push(t.to_string());
    }
  }
  Ok(out)
}
