//! Domain models: difficulty levels, generated courses, quiz and open questions,
//! answer evaluations and stored course records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Topic used when the caller leaves the topic blank.
pub const DEFAULT_TOPIC: &str = "General knowledge";

/// Score scale of open-answer evaluations.
pub const EVALUATION_MAX_SCORE: u8 = 10;

/// Difficulty level controlling prompt phrasing and adaptive progression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Expert,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Expert];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Expert => "expert",
    }
  }

  /// Adaptive progression after a finished quiz: step up at >= 80%,
  /// step down at <= 40%, stay otherwise. Clamped at both ends.
  pub fn adjust(self, percent: u32) -> Difficulty {
    let idx = Self::ALL.iter().position(|d| *d == self).unwrap_or(0);
    let next = if percent >= 80 {
      (idx + 1).min(Self::ALL.len() - 1)
    } else if percent <= 40 {
      idx.saturating_sub(1)
    } else {
      idx
    };
    Self::ALL[next]
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Difficulty {
  type Err = String;

  /// Accepts the English names plus the labels used by the mobile client.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "easy" | "легкий" | "лёгкий" => Ok(Difficulty::Easy),
      "medium" | "средний" => Ok(Difficulty::Medium),
      "expert" | "hard" | "эксперт" => Ok(Difficulty::Expert),
      other => Err(format!("unknown difficulty '{other}'")),
    }
  }
}

impl<'de> Deserialize<'de> for Difficulty {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

/// Input of one generation call, normalized.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub topic: String,
  pub difficulty: Difficulty,
  pub api_key: Option<String>,
  pub model_id: String,
}

impl GenerationRequest {
  /// Trims the topic (substituting `DEFAULT_TOPIC` when blank) and drops blank keys.
  pub fn new(topic: &str, difficulty: Difficulty, api_key: Option<&str>, model_id: &str) -> Self {
    let topic = match topic.trim() {
      "" => DEFAULT_TOPIC.to_string(),
      t => t.to_string(),
    };
    let api_key = api_key.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string);
    Self { topic, difficulty, api_key, model_id: model_id.to_string() }
  }
}

/// One multiple-choice question. Only built by the validator or the fallback
/// generator, so every instance satisfies the schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
  pub question: String,
  pub options: [String; 4],
  pub answer: u8,
}

/// Theory + multiple-choice questions for one topic/difficulty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseContent {
  pub theory: String,
  pub questions: Vec<QuizQuestion>,
  #[serde(default)]
  pub meta: Map<String, Value>,
  /// Set only on fallback content.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl CourseContent {
  pub fn topic(&self) -> Option<&str> {
    self.meta.get("topic").and_then(Value::as_str)
  }

  pub fn difficulty(&self) -> Option<Difficulty> {
    self.meta.get("difficulty").and_then(Value::as_str).and_then(|d| d.parse().ok())
  }

  pub fn is_fallback(&self) -> bool {
    self.error.is_some()
  }
}

/// Open-ended question with optional grading hints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQuestion {
  pub question: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvaluation {
  pub score: u8,
  pub max_score: u8,
  pub commentary: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub suggested_improvements: Option<String>,
}

impl AnswerEvaluation {
  /// Zero-score result returned whenever evaluation cannot be completed.
  pub fn neutral(commentary: impl Into<String>) -> Self {
    Self {
      score: 0,
      max_score: EVALUATION_MAX_SCORE,
      commentary: commentary.into(),
      suggested_improvements: None,
    }
  }
}

/// Open-answer part of an attempt: summed evaluation scores out of
/// `EVALUATION_MAX_SCORE` per answered question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenScore {
  pub score: u32,
  pub max: u32,
}

/// Quiz attempt kept in a stored course's history, newest first.
/// `score`/`total` are the multiple-choice part; `percent` covers the whole attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
  pub score: u32,
  pub total: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub open: Option<OpenScore>,
  pub percent: u32,
  pub at: DateTime<Utc>,
}

/// A generated course as kept in the course store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
  pub id: String,
  #[serde(flatten)]
  pub content: CourseContent,
  #[serde(default)]
  pub history: Vec<QuizResult>,
  pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_parses_client_labels() {
    assert_eq!("легкий".parse::<Difficulty>().unwrap(), Difficulty::Easy);
    assert_eq!(" Medium ".parse::<Difficulty>().unwrap(), Difficulty::Medium);
    assert_eq!("эксперт".parse::<Difficulty>().unwrap(), Difficulty::Expert);
    assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Expert);
    assert!("impossible".parse::<Difficulty>().is_err());
  }

  #[test]
  fn difficulty_serde_uses_lowercase_names() {
    let d: Difficulty = serde_json::from_str("\"средний\"").unwrap();
    assert_eq!(d, Difficulty::Medium);
    assert_eq!(serde_json::to_string(&Difficulty::Expert).unwrap(), "\"expert\"");
  }

  #[test]
  fn adaptive_difficulty_steps_and_clamps() {
    assert_eq!(Difficulty::Easy.adjust(85), Difficulty::Medium);
    assert_eq!(Difficulty::Expert.adjust(100), Difficulty::Expert);
    assert_eq!(Difficulty::Medium.adjust(40), Difficulty::Easy);
    assert_eq!(Difficulty::Easy.adjust(0), Difficulty::Easy);
    assert_eq!(Difficulty::Medium.adjust(60), Difficulty::Medium);
  }

  #[test]
  fn blank_topic_is_substituted() {
    let req = GenerationRequest::new("   ", Difficulty::Easy, Some("  "), "m");
    assert_eq!(req.topic, DEFAULT_TOPIC);
    assert!(req.api_key.is_none());
    let req = GenerationRequest::new(" Mars ", Difficulty::Easy, Some("k"), "m");
    assert_eq!(req.topic, "Mars");
    assert_eq!(req.api_key.as_deref(), Some("k"));
  }

  #[test]
  fn course_record_flattens_content() {
    let rec = CourseRecord {
      id: "x".into(),
      content: CourseContent {
        theory: "t".into(),
        questions: vec![],
        meta: Map::new(),
        error: None,
      },
      history: vec![],
      saved_at: Utc::now(),
    };
    let v = serde_json::to_value(&rec).unwrap();
    assert_eq!(v["theory"], "t");
    assert!(v.get("error").is_none());
    let back: CourseRecord = serde_json::from_value(v).unwrap();
    assert_eq!(back, rec);
  }
}
