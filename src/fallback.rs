//! Offline course shown whenever generation is impossible.

use serde_json::{Map, Value};

use crate::domain::{CourseContent, Difficulty, QuizQuestion};

fn q(question: String, options: [&str; 4], answer: u8) -> QuizQuestion {
  QuizQuestion { question, options: options.map(str::to_string), answer }
}

/// Deterministic stand-in course: a short offline notice plus three questions.
/// `error`, when given, is shown in red at the top and kept in `CourseContent::error`.
pub fn fallback_course(topic: &str, difficulty: Difficulty, error: Option<&str>) -> CourseContent {
  let mut theory = String::from("[b]Offline mode[/b]\n\n");
  if let Some(e) = error {
    theory.push_str(&format!("[color=ff0000]Error: {e}[/color]\n\n"));
  }
  theory.push_str("Unfortunately the generation service is temporarily unavailable.\n\n");
  theory.push_str(&format!("[b]Topic:[/b] {topic}\n"));
  theory.push_str(&format!("[b]Difficulty:[/b] {difficulty}\n\n"));
  theory.push_str("Please try again later.");

  let mut meta = Map::new();
  meta.insert("topic".into(), Value::String(topic.to_string()));
  meta.insert("difficulty".into(), Value::String(difficulty.as_str().to_string()));

  CourseContent {
    theory,
    questions: vec![
      q(format!("Sample question about {topic}?"), ["Yes", "No", "Maybe", "I don't know"], 0),
      q("How many bits are in a byte?".into(), ["4", "8", "16", "32"], 1),
      q("What is the capital of France?".into(), ["London", "Berlin", "Paris", "Madrid"], 2),
    ],
    meta,
    error: error.map(str::to_string),
  }
}
