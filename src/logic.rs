//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Generating a course (theory + quiz), never failing: offline content on any error
//!   - Generating open questions (cached per topic/difficulty)
//!   - Grading a free-text answer
//!   - Suggesting follow-up topics, backed by topic memory
//!   - Recording quiz results for adaptive difficulty

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{AnswerEvaluation, CourseContent, Difficulty, GenerationRequest, OpenQuestion, OpenScore};
use crate::fallback::fallback_course;
use crate::prompt::{build_course_request, build_evaluation_request, build_next_topics_request, build_open_questions_request};
use crate::state::AppState;
use crate::store::{RecordedResult, StoreError};
use crate::validate::{parse_evaluation, parse_open_questions, parse_topics, validate_course, Validation};

pub const MISSING_KEY_MESSAGE: &str = "API key not found. Enter a key in settings.";

#[instrument(level = "info", skip(state, api_key), fields(%topic, %difficulty))]
pub async fn generate_course(state: &AppState, topic: &str, difficulty: Difficulty, api_key: Option<&str>) -> CourseContent {
  let key = state.llm.resolve_key(api_key);
  let req = GenerationRequest::new(topic, difficulty, key.as_deref(), state.llm.model());
  let Some(key) = req.api_key.as_deref() else {
    warn!(target: "course", topic = %req.topic, "No API key; serving offline course");
    return fallback_course(&req.topic, req.difficulty, Some(MISSING_KEY_MESSAGE));
  };

  let body = build_course_request(&state.prompts, &req);
  let raw = match state.llm.complete(key, &body).await {
    Ok(raw) => raw,
    Err(e) => {
      error!(target: "course", topic = %req.topic, error = %e, "Course generation failed; serving offline course");
      return fallback_course(&req.topic, req.difficulty, Some(e.to_string().as_str()));
    }
  };

  let course = match validate_course(&raw, &req.topic, req.difficulty) {
    Validation::Valid(c) => c,
    Validation::Invalid(reason) => {
      error!(target: "course", topic = %req.topic, %reason, "Model output rejected; serving offline course");
      return fallback_course(&req.topic, req.difficulty, Some(reason.to_string().as_str()));
    }
  };
  info!(target: "course", topic = %req.topic, questions = course.questions.len(), "Course generated");

  if let Err(e) = state.topics.add(&req.topic).await {
    warn!(target: "store", error = %e, "Could not remember topic");
  }
  match state.courses.save(course.clone()).await {
    Ok(record) => record.content,
    Err(e) => {
      warn!(target: "store", error = %e, "Could not save course");
      course
    }
  }
}

/// Cached questions when present; otherwise one generation round trip.
/// Failures yield an empty list; there is no canned fallback.
#[instrument(level = "info", skip(state, api_key), fields(%topic, n, %difficulty))]
pub async fn generate_open_questions(
  state: &AppState,
  topic: &str,
  n: usize,
  difficulty: Difficulty,
  api_key: Option<&str>,
) -> Vec<OpenQuestion> {
  let key = state.llm.resolve_key(api_key);
  let req = GenerationRequest::new(topic, difficulty, key.as_deref(), state.llm.model());

  if let Some(mut cached) = state.cache.get(&req.topic, req.difficulty).await {
    debug!(target: "course", topic = %req.topic, count = cached.len(), "Open questions served from cache");
    cached.truncate(n);
    return cached;
  }
  let Some(key) = req.api_key.as_deref() else {
    warn!(target: "course", "No API key; no open questions");
    return Vec::new();
  };

  let body = build_open_questions_request(&state.prompts, &req.model_id, &req.topic, n, req.difficulty);
  let mut questions = match state.llm.complete_text(key, &body).await {
    Ok(text) => match parse_open_questions(&text) {
      Ok(q) => q,
      Err(e) => {
        error!(target: "course", error = %e, "Open questions unusable");
        return Vec::new();
      }
    },
    Err(e) => {
      error!(target: "course", error = %e, "Open question generation failed");
      return Vec::new();
    }
  };
  questions.truncate(n);

  if let Err(e) = state.cache.put(&req.topic, req.difficulty, questions.clone()).await {
    warn!(target: "store", error = %e, "Could not cache open questions");
  }
  info!(target: "course", topic = %req.topic, count = questions.len(), "Open questions generated");
  questions
}

/// Grade a free-text answer. Any failure, a blank answer or a missing key
/// yields a zero-score neutral evaluation.
#[instrument(level = "info", skip(state, question, answer_text, notes, api_key), fields(answer_len = answer_text.len()))]
pub async fn evaluate_answer(
  state: &AppState,
  question: &str,
  answer_text: &str,
  notes: Option<&str>,
  api_key: Option<&str>,
) -> AnswerEvaluation {
  if answer_text.trim().is_empty() {
    return AnswerEvaluation::neutral("No answer given.");
  }
  let Some(key) = state.llm.resolve_key(api_key) else {
    return AnswerEvaluation::neutral("Evaluation unavailable: API key not found.");
  };

  let body = build_evaluation_request(&state.prompts, state.llm.model(), question, answer_text.trim(), notes);
  let text = match state.llm.complete_text(&key, &body).await {
    Ok(t) => t,
    Err(e) => {
      error!(target: "course", error = %e, "Answer evaluation failed");
      return AnswerEvaluation::neutral(format!("Evaluation unavailable: {e}"));
    }
  };
  match parse_evaluation(&text) {
    Ok(eval) => {
      info!(target: "course", score = eval.score, "Answer evaluated");
      eval
    }
    Err(e) => {
      error!(target: "course", error = %e, "Evaluation output unusable");
      AnswerEvaluation::neutral(format!("Evaluation unavailable: {e}"))
    }
  }
}

/// Up to `n` distinct topic titles following the material; remembered on success.
#[instrument(level = "info", skip(state, prior_material, api_key), fields(material_len = prior_material.len(), n))]
pub async fn generate_next_topics(state: &AppState, prior_material: &str, n: usize, api_key: Option<&str>) -> Vec<String> {
  let Some(key) = state.llm.resolve_key(api_key) else {
    return Vec::new();
  };
  let body = build_next_topics_request(&state.prompts, state.llm.model(), prior_material, n);
  let topics = match state.llm.complete_text(&key, &body).await {
    Ok(text) => parse_topics(&text, n).unwrap_or_else(|e| {
      error!(target: "course", error = %e, "Next topics unusable");
      Vec::new()
    }),
    Err(e) => {
      error!(target: "course", error = %e, "Next topic generation failed");
      Vec::new()
    }
  };
  if !topics.is_empty() {
    if let Err(e) = state.topics.add_many(topics.iter().map(String::as_str)).await {
      warn!(target: "store", error = %e, "Could not remember suggested topics");
    }
  }
  topics
}

/// `generate_next_topics`, or the first `n` remembered topics when that yields nothing.
pub async fn suggest_followups(state: &AppState, prior_material: &str, n: usize, api_key: Option<&str>) -> Vec<String> {
  let fresh = generate_next_topics(state, prior_material, n, api_key).await;
  if !fresh.is_empty() {
    return fresh;
  }
  let mut remembered = state.topics.list().await;
  remembered.truncate(n);
  debug!(target: "course", count = remembered.len(), "Follow-ups taken from topic memory");
  remembered
}

pub async fn record_result(
  state: &AppState,
  topic: &str,
  difficulty: Difficulty,
  score: u32,
  total: u32,
  open: Option<OpenScore>,
) -> Result<RecordedResult, StoreError> {
  let recorded = state.courses.record_result(topic.trim(), difficulty, score, total, open).await?;
  info!(
    target: "course",
    topic = %topic.trim(),
    percent = recorded.percent,
    mc_percent = recorded.mc_percent,
    open_percent = ?recorded.open_percent,
    next = %recorded.next_difficulty,
    stored = recorded.stored,
    "Quiz result recorded"
  );
  Ok(recorded)
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;
  use std::sync::Arc;

  use serde_json::json;
  use tempfile::TempDir;

  use super::*;
  use crate::config::AgentConfig;
  use crate::domain::DEFAULT_TOPIC;
  use crate::transport::testing::{completion, FakeTransport};
  use crate::transport::{Transport, TransportError, TransportSelector};

  async fn state_with(t: FakeTransport, default_key: Option<&str>) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = AgentConfig::default();
    cfg.storage.data_dir = dir.path().to_path_buf();
    cfg.api.default_api_key = default_key.map(str::to_string);
    let chain: Vec<Arc<dyn Transport>> = vec![Arc::new(t)];
    let state = AppState::with_selector(cfg, TransportSelector::new(chain, vec![])).await;
    (state, dir)
  }

  fn course_json(n: usize) -> String {
    let qs: Vec<_> = (0..n)
      .map(|i| json!({"question": format!("Q{i}"), "options": ["a", "b", "c", "d"], "answer": 1}))
      .collect();
    json!({"theory": "[b]Cells[/b]\nbody", "questions": qs}).to_string()
  }

  fn dns_down() -> FakeTransport {
    FakeTransport::failing("blocking", TransportError::Dns("failed to lookup address".into()))
  }

  #[tokio::test]
  async fn course_without_key_makes_no_call() {
    let (state, _dir) = state_with(FakeTransport::ok("t", completion(&course_json(3))), None).await;
    let c = generate_course(&state, "Cells", Difficulty::Easy, None).await;
    assert_eq!(state.llm.selector().calls(), 0);
    assert_eq!(c.error.as_deref(), Some(MISSING_KEY_MESSAGE));
    assert_eq!(c.topic(), Some("Cells"));
    assert_eq!(c.difficulty(), Some(Difficulty::Easy));
    assert_eq!(c.questions.len(), 3);
  }

  #[tokio::test]
  async fn transport_failure_yields_offline_course_that_is_not_saved() {
    let (state, _dir) = state_with(dns_down(), Some("k")).await;
    let c = generate_course(&state, "  ", Difficulty::Medium, None).await;
    assert!(c.is_fallback());
    assert!(c.error.as_deref().unwrap().contains("all HTTP transports failed"));
    assert_eq!(c.topic(), Some(DEFAULT_TOPIC));
    assert!(state.courses.list().await.is_empty());
    assert!(state.topics.list().await.is_empty());
  }

  #[tokio::test]
  async fn invalid_model_output_yields_offline_course() {
    let (state, _dir) = state_with(FakeTransport::ok("t", completion("{\"theory\": 1}")), Some("k")).await;
    let c = generate_course(&state, "Cells", Difficulty::Medium, Some("user")).await;
    assert_eq!(c.error.as_deref(), Some("'questions' is not an array"));
  }

  #[tokio::test]
  async fn all_malformed_questions_yield_offline_course() {
    let bad = json!({
      "theory": "T",
      "questions": [
        {"question": "three", "options": ["a", "b", "c"], "answer": 0},
        {"question": "range", "options": ["a", "b", "c", "d"], "answer": 7},
        {"question": 42, "options": ["a", "b", "c", "d"], "answer": 1}
      ]
    });
    let (state, _dir) = state_with(FakeTransport::ok("t", completion(&bad.to_string())), Some("k")).await;
    let c = generate_course(&state, "Cells", Difficulty::Easy, None).await;
    assert_eq!(c.questions.len(), 3);
    assert_eq!(c.error.as_deref(), Some("no valid questions in model output"));
    assert_eq!(c.topic(), Some("Cells"));
    assert!(state.courses.list().await.is_empty());
  }

  #[tokio::test]
  async fn valid_course_is_saved_and_topic_remembered() {
    let t = FakeTransport::ok("t", completion(&course_json(10)));
    let sent = t.last_body.clone();
    let (state, _dir) = state_with(t, None).await;
    let c = generate_course(&state, " Cells ", Difficulty::Expert, Some("user-key")).await;

    assert!(!c.is_fallback());
    assert_eq!(c.questions.len(), 10);
    assert_eq!(c.meta["notes"]["quick_hint"], "[b]Cells[/b] body");
    assert_eq!(state.topics.list().await, vec!["Cells"]);
    assert!(state.courses.find("Cells", Difficulty::Expert).await.is_some());
    let body = sent.lock().clone().unwrap();
    assert!(body["messages"][1]["content"].as_str().unwrap().contains("'Cells'"));
  }

  #[tokio::test]
  async fn open_questions_are_cached_after_first_call() {
    let t = FakeTransport::ok("t", completion(r#"[{"question": "A?"}, {"question": "B?"}, {"question": "C?"}]"#));
    let calls = t.calls.clone();
    let (state, _dir) = state_with(t, Some("k")).await;

    let first = generate_open_questions(&state, "Cells", 2, Difficulty::Easy, None).await;
    assert_eq!(first.len(), 2);
    let again = generate_open_questions(&state, " CELLS ", 2, Difficulty::Easy, None).await;
    assert_eq!(again, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn open_question_failures_are_empty_and_uncached() {
    let (state, _dir) = state_with(dns_down(), Some("k")).await;
    assert!(generate_open_questions(&state, "Cells", 3, Difficulty::Easy, None).await.is_empty());
    assert_eq!(state.cache.len().await, 0);
  }

  #[tokio::test]
  async fn evaluation_is_neutral_on_failure_and_clamped_on_success() {
    let (down, _d1) = state_with(dns_down(), Some("k")).await;
    let e = evaluate_answer(&down, "Q?", "answer", None, None).await;
    assert_eq!((e.score, e.max_score), (0, 10));
    assert!(e.commentary.starts_with("Evaluation unavailable"));

    let blank = evaluate_answer(&down, "Q?", "   ", None, None).await;
    assert_eq!(blank.score, 0);
    assert_eq!(down.llm.selector().calls(), 1);

    let (up, _d2) = state_with(FakeTransport::ok("t", completion(r#"{"score": 12, "commentary": "ok"}"#)), Some("k")).await;
    let e = evaluate_answer(&up, "Q?", "answer", Some("key points"), None).await;
    assert_eq!(e.score, 10);
    assert_eq!(e.commentary, "ok");
  }

  #[tokio::test]
  async fn next_topics_are_remembered() {
    let (state, _dir) = state_with(FakeTransport::ok("t", completion(r#"["Mitosis", "Meiosis", "Mitosis"]"#)), Some("k")).await;
    let topics = generate_next_topics(&state, "cells divide", 5, None).await;
    assert_eq!(topics, vec!["Mitosis", "Meiosis"]);
    assert_eq!(state.topics.list().await, vec!["Mitosis", "Meiosis"]);
  }

  #[tokio::test]
  async fn followups_fall_back_to_memory() {
    let (state, _dir) = state_with(dns_down(), Some("k")).await;
    state.topics.add_many(["A", "B", "C"]).await.unwrap();
    assert_eq!(suggest_followups(&state, "material", 2, None).await, vec!["A", "B"]);
  }

  #[tokio::test]
  async fn result_adjusts_difficulty() {
    let (state, _dir) = state_with(FakeTransport::ok("t", completion(&course_json(10))), Some("k")).await;
    generate_course(&state, "Cells", Difficulty::Medium, None).await;
    let r = record_result(&state, "Cells", Difficulty::Medium, 3, 10, None).await.unwrap();
    assert_eq!(r.next_difficulty, Difficulty::Easy);
    assert!(r.stored);
    assert_eq!(state.courses.find("Cells", Difficulty::Medium).await.unwrap().history.len(), 1);
  }

  #[tokio::test]
  async fn open_answers_pull_the_combined_percent() {
    let (state, _dir) = state_with(FakeTransport::ok("t", completion(&course_json(10))), Some("k")).await;
    generate_course(&state, "Cells", Difficulty::Medium, None).await;
    // 10/10 alone would step up; 20 of 50 open points brings it to (100 + 40) / 2.
    let r = record_result(&state, "Cells", Difficulty::Medium, 10, 10, Some(OpenScore { score: 20, max: 50 }))
      .await
      .unwrap();
    assert_eq!(r.percent, 70);
    assert_eq!(r.next_difficulty, Difficulty::Medium);
  }
}
