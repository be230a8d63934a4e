//! Saved courses, most recent first, with per-course quiz history.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{load_json_or_default, write_json_atomic, StoreError};
use crate::domain::{CourseContent, CourseRecord, Difficulty, OpenScore, QuizResult};
use crate::util::flat_snippet;

const QUICK_HINT_CHARS: usize = 200;

/// Outcome of `CourseStore::record_result`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedResult {
  /// Whole attempt: the multiple-choice percent, or the mean with the open part.
  pub percent: u32,
  pub mc_percent: u32,
  pub open_percent: Option<u32>,
  pub next_difficulty: Difficulty,
  /// False when no saved course matched; the difficulty advice still applies.
  pub stored: bool,
}

/// Rounded percentage; `score` is capped at `total`, zero totals give 0.
pub fn percent(score: u32, total: u32) -> u32 {
  if total == 0 {
    return 0;
  }
  ((score.min(total) as f64 * 100.0) / total as f64).round() as u32
}

/// Mean of the two part percents, truncated. The open part only counts with a non-zero max.
pub fn combined_percent(mc_percent: u32, open: Option<OpenScore>) -> (u32, Option<u32>) {
  match open.filter(|o| o.max > 0) {
    Some(o) => {
      let open_percent = percent(o.score, o.max);
      ((mc_percent + open_percent) / 2, Some(open_percent))
    }
    None => (mc_percent, None),
  }
}

fn set_quick_hint(content: &mut CourseContent, hint: String) {
  match content.meta.get_mut("notes") {
    Some(Value::Object(notes)) => {
      notes.insert("quick_hint".into(), Value::String(hint));
    }
    _ => {
      content.meta.insert("notes".into(), json!({ "quick_hint": hint }));
    }
  }
}

/// Existing non-empty hint, else one derived from the theory.
fn current_quick_hint(content: &CourseContent) -> String {
  content
    .meta
    .get("notes")
    .and_then(|n| n.get("quick_hint"))
    .and_then(Value::as_str)
    .filter(|h| !h.trim().is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| flat_snippet(&content.theory, QUICK_HINT_CHARS))
}

fn same_key(rec: &CourseRecord, topic: &str, difficulty: Difficulty) -> bool {
  rec.content.topic() == Some(topic) && rec.content.difficulty() == Some(difficulty)
}

pub struct CourseStore {
  path: PathBuf,
  courses: Mutex<Vec<CourseRecord>>,
}

impl CourseStore {
  pub async fn open(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref().to_path_buf();
    let courses: Vec<CourseRecord> = load_json_or_default(&path).await;
    Self { path, courses: Mutex::new(courses) }
  }

  /// Insert at the front, replacing the course with the same topic and
  /// difficulty (its id and quiz history are kept). Adds `meta.notes.quick_hint`.
  pub async fn save(&self, mut content: CourseContent) -> Result<CourseRecord, StoreError> {
    let hint = flat_snippet(&content.theory, QUICK_HINT_CHARS);
    set_quick_hint(&mut content, hint);

    let topic = content.topic().unwrap_or_default().to_string();
    let difficulty = content.difficulty().unwrap_or_default();

    let mut courses = self.courses.lock().await;
    let previous = courses
      .iter()
      .position(|c| same_key(c, &topic, difficulty))
      .map(|idx| courses.remove(idx));
    let record = match previous {
      Some(old) => CourseRecord { id: old.id, content, history: old.history, saved_at: Utc::now() },
      None => CourseRecord { id: Uuid::new_v4().to_string(), content, history: Vec::new(), saved_at: Utc::now() },
    };
    courses.insert(0, record.clone());
    write_json_atomic(&self.path, &*courses).await?;
    info!(target: "store", %topic, %difficulty, total = courses.len(), "Course saved");
    Ok(record)
  }

  pub async fn find(&self, topic: &str, difficulty: Difficulty) -> Option<CourseRecord> {
    self.courses.lock().await.iter().find(|c| same_key(c, topic, difficulty)).cloned()
  }

  /// Apply `update` to the matching course and persist. Returns whether one matched.
  pub async fn update_entry<F>(&self, topic: &str, difficulty: Difficulty, update: F) -> Result<bool, StoreError>
  where
    F: FnOnce(&mut CourseRecord),
  {
    let mut courses = self.courses.lock().await;
    let Some(rec) = courses.iter_mut().find(|c| same_key(c, topic, difficulty)) else {
      return Ok(false);
    };
    update(rec);
    write_json_atomic(&self.path, &*courses).await?;
    Ok(true)
  }

  pub async fn delete(&self, topic: &str, difficulty: Difficulty) -> Result<bool, StoreError> {
    let mut courses = self.courses.lock().await;
    let before = courses.len();
    courses.retain(|c| !same_key(c, topic, difficulty));
    if courses.len() == before {
      return Ok(false);
    }
    write_json_atomic(&self.path, &*courses).await?;
    Ok(true)
  }

  pub async fn list(&self) -> Vec<CourseRecord> {
    self.courses.lock().await.clone()
  }

  /// Put a quiz attempt at the head of the course history, refresh the quick
  /// hint and step the difficulty from the combined percent.
  pub async fn record_result(
    &self,
    topic: &str,
    difficulty: Difficulty,
    score: u32,
    total: u32,
    open: Option<OpenScore>,
  ) -> Result<RecordedResult, StoreError> {
    let mc_percent = percent(score, total);
    let open = open.filter(|o| o.max > 0).map(|o| OpenScore { score: o.score.min(o.max), max: o.max });
    let (combined, open_percent) = combined_percent(mc_percent, open);
    let result = QuizResult { score: score.min(total), total, open, percent: combined, at: Utc::now() };
    let stored = self
      .update_entry(topic, difficulty, |rec| {
        rec.history.insert(0, result);
        let hint = current_quick_hint(&rec.content);
        set_quick_hint(&mut rec.content, hint);
      })
      .await?;
    Ok(RecordedResult {
      percent: combined,
      mc_percent,
      open_percent,
      next_difficulty: difficulty.adjust(combined),
      stored,
    })
  }
}
