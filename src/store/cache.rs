//! Persistent cache of generated open questions keyed by topic and difficulty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

use super::{load_json_or_default, write_json_atomic, StoreError};
use crate::domain::{Difficulty, OpenQuestion};
use crate::util::normalize_topic;

/// `"<trimmed lowercased topic>|<difficulty>"`.
pub fn cache_key(topic: &str, difficulty: Difficulty) -> String {
  format!("{}|{}", normalize_topic(topic), difficulty.as_str())
}

pub struct OpenQuestionCache {
  path: PathBuf,
  entries: Mutex<BTreeMap<String, Vec<OpenQuestion>>>,
}

impl OpenQuestionCache {
  pub async fn open(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref().to_path_buf();
    let entries: BTreeMap<String, Vec<OpenQuestion>> = load_json_or_default(&path).await;
    debug!(target: "store", path = %path.display(), entries = entries.len(), "Open-question cache loaded");
    Self { path, entries: Mutex::new(entries) }
  }

  pub async fn get(&self, topic: &str, difficulty: Difficulty) -> Option<Vec<OpenQuestion>> {
    self.entries.lock().await.get(&cache_key(topic, difficulty)).cloned()
  }

  /// Stores and persists the list. Empty lists are never cached.
  pub async fn put(&self, topic: &str, difficulty: Difficulty, questions: Vec<OpenQuestion>) -> Result<(), StoreError> {
    if questions.is_empty() {
      return Ok(());
    }
    let mut entries = self.entries.lock().await;
    entries.insert(cache_key(topic, difficulty), questions);
    write_json_atomic(&self.path, &*entries).await
  }

  pub async fn len(&self) -> usize {
    self.entries.lock().await.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn oq(q: &str) -> OpenQuestion {
    OpenQuestion { question: q.into(), notes: Some("n".into()) }
  }

  #[tokio::test]
  async fn keys_ignore_case_and_surrounding_space() {
    let dir = tempfile::tempdir().unwrap();
    let cache = OpenQuestionCache::open(dir.path().join("c.json")).await;
    cache.put("  Rust Ownership ", Difficulty::Medium, vec![oq("Why move?")]).await.unwrap();

    assert_eq!(cache.get("rust ownership", Difficulty::Medium).await, Some(vec![oq("Why move?")]));
    assert_eq!(cache.get("rust ownership", Difficulty::Expert).await, None);
    assert_eq!(cache.get("borrowing", Difficulty::Medium).await, None);
  }

  #[tokio::test]
  async fn empty_put_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    let cache = OpenQuestionCache::open(&path).await;
    cache.put("x", Difficulty::Easy, vec![]).await.unwrap();
    assert_eq!(cache.get("x", Difficulty::Easy).await, None);
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    {
      let cache = OpenQuestionCache::open(&path).await;
      cache.put("Mars", Difficulty::Easy, vec![oq("Colour?")]).await.unwrap();
    }
    let reopened = OpenQuestionCache::open(&path).await;
    assert_eq!(reopened.len().await, 1);
    assert_eq!(reopened.get("MARS", Difficulty::Easy).await.unwrap()[0].question, "Colour?");

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("mars|easy").is_some());
  }

  #[tokio::test]
  async fn corrupt_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.json");
    std::fs::write(&path, "[[[").unwrap();
    let cache = OpenQuestionCache::open(&path).await;
    assert_eq!(cache.len().await, 0);
  }
}
