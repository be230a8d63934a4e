//! JSON-file persistence: open-question cache, topic memory and saved courses.
//!
//! Each store keeps its whole file in memory behind an async mutex, loads it
//! eagerly on open and rewrites it wholesale on every change (temp file +
//! rename). A missing file is an empty store; an unreadable one is logged and
//! treated as empty so a corrupt file never blocks startup.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub mod cache;
pub mod courses;
pub mod topics;

pub use cache::OpenQuestionCache;
pub use courses::{CourseStore, RecordedResult};
pub use topics::TopicMemory;

pub const COURSES_FILE: &str = "courses.json";
pub const CACHE_FILE: &str = "open_questions_cache.json";
pub const TOPICS_FILE: &str = "course_topics.json";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot serialize store contents: {0}")]
  Serialization(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
  move |source| StoreError::Io { path: path.to_path_buf(), source }
}

/// Read and parse `path`; absent or unparsable files yield `T::default()`.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
  let raw = match tokio::fs::read_to_string(path).await {
    Ok(s) => s,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      debug!(target: "store", path = %path.display(), "No store file yet; starting empty");
      return T::default();
    }
    Err(e) => {
      warn!(target: "store", path = %path.display(), error = %e, "Store file unreadable; starting empty");
      return T::default();
    }
  };
  match serde_json::from_str(&raw) {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "store", path = %path.display(), error = %e, "Store file corrupt; starting empty");
      T::default()
    }
  }
}

/// Pretty-print `value` into `path` via a sibling temp file and a rename.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
  let json = serde_json::to_string_pretty(value)?;
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
  }
  let tmp = path.with_extension("json.tmp");
  tokio::fs::write(&tmp, json).await.map_err(io_err(&tmp))?;
  tokio::fs::rename(&tmp, path).await.map_err(io_err(path))?;
  debug!(target: "store", path = %path.display(), "Store written");
  Ok(())
}
