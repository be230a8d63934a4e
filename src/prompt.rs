//! Chat-completion request bodies for every generation call.
//!
//! Pure functions: templates come from `Prompts`, placeholders are filled with
//! `fill_template`, nothing here can fail.

use serde::Serialize;

use crate::config::Prompts;
use crate::domain::{Difficulty, GenerationRequest};
use crate::util::fill_template;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
  pub model: String,
  pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

impl ChatCompletionRequest {
  fn system_user(model: &str, system: &str, user: String) -> Self {
    Self {
      model: model.to_string(),
      messages: vec![
        ChatMessage { role: "system".into(), content: system.to_string() },
        ChatMessage { role: "user".into(), content: user },
      ],
    }
  }
}

/// Theory + exactly 10 multiple-choice questions, as one JSON object.
pub fn build_course_request(prompts: &Prompts, req: &GenerationRequest) -> ChatCompletionRequest {
  let user = fill_template(
    &prompts.course_user_template,
    &[("topic", &req.topic), ("difficulty", req.difficulty.as_str())],
  );
  ChatCompletionRequest::system_user(&req.model_id, &prompts.course_system, user)
}

pub fn build_open_questions_request(
  prompts: &Prompts,
  model: &str,
  topic: &str,
  n: usize,
  difficulty: Difficulty,
) -> ChatCompletionRequest {
  let n = n.to_string();
  let user = fill_template(
    &prompts.open_questions_user_template,
    &[("topic", topic), ("difficulty", difficulty.as_str()), ("n", &n)],
  );
  ChatCompletionRequest::system_user(model, &prompts.open_questions_system, user)
}

pub fn build_evaluation_request(
  prompts: &Prompts,
  model: &str,
  question: &str,
  answer: &str,
  notes: Option<&str>,
) -> ChatCompletionRequest {
  let user = fill_template(
    &prompts.evaluation_user_template,
    &[("question", question), ("notes", notes.unwrap_or("(none)")), ("answer", answer)],
  );
  ChatCompletionRequest::system_user(model, &prompts.evaluation_system, user)
}

pub fn build_next_topics_request(prompts: &Prompts, model: &str, material: &str, n: usize) -> ChatCompletionRequest {
  let n = n.to_string();
  let user = fill_template(&prompts.next_topics_user_template, &[("material", material), ("n", &n)]);
  ChatCompletionRequest::system_user(model, &prompts.next_topics_system, user)
}
