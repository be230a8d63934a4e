//! Persistent list of topics the user has studied or was suggested.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::{load_json_or_default, write_json_atomic, StoreError};

pub struct TopicMemory {
  path: PathBuf,
  topics: Mutex<Vec<String>>,
}

impl TopicMemory {
  pub async fn open(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref().to_path_buf();
    let topics: Vec<String> = load_json_or_default(&path).await;
    Self { path, topics: Mutex::new(topics) }
  }

  pub async fn list(&self) -> Vec<String> {
    self.topics.lock().await.clone()
  }

  /// Appends the trimmed topic unless blank or already present (exact match).
  /// Returns whether it was added.
  pub async fn add(&self, topic: &str) -> Result<bool, StoreError> {
    Ok(self.add_many(std::iter::once(topic)).await? == 1)
  }

  /// Adds every new topic and persists once. Returns how many were added.
  pub async fn add_many<'a, I>(&self, topics: I) -> Result<usize, StoreError>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut list = self.topics.lock().await;
    let mut added = 0;
    for t in topics.into_iter().map(str::trim) {
      if !t.is_empty() && !list.iter().any(|x| x == t) {
        list.push(t.to_string());
        added += 1;
      }
    }
    if added > 0 {
      write_json_atomic(&self.path, &*list).await?;
    }
    Ok(added)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn add_trims_skips_blank_and_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let mem = TopicMemory::open(dir.path().join("t.json")).await;
    assert!(mem.add(" Rust ").await.unwrap());
    assert!(!mem.add("Rust").await.unwrap());
    assert!(!mem.add("   ").await.unwrap());
    assert!(mem.add("rust").await.unwrap());
    assert_eq!(mem.list().await, vec!["Rust", "rust"]);
  }

  #[tokio::test]
  async fn add_many_persists_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.json");
    let mem = TopicMemory::open(&path).await;
    assert_eq!(mem.add_many(["A", "B", "A", ""]).await.unwrap(), 2);

    let reopened = TopicMemory::open(&path).await;
    assert_eq!(reopened.list().await, vec!["A", "B"]);
  }

  #[tokio::test]
  async fn nothing_new_means_no_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.json");
    let mem = TopicMemory::open(&path).await;
    assert_eq!(mem.add_many([" "]).await.unwrap(), 0);
    assert!(!path.exists());
  }
}
