//! Loading backend configuration (API settings, storage, prompts) from TOML + env.
//!
//! See `AgentConfig` and `Prompts` for expected schema. Every section is optional;
//! missing keys keep their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemma-3-1b-it:free";

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
  pub api: ApiConfig,
  pub storage: StorageConfig,
  pub prompts: Prompts,
}

/// Remote chat-completion endpoint and transport settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub endpoint: String,
  pub model: String,
  /// Per-attempt budget; every transport strategy gets the full amount.
  pub timeout_secs: u64,
  pub user_agent: String,
  pub referer: String,
  pub title: String,
  /// IP literals of the endpoint host, tried only after a DNS failure.
  pub fallback_ips: Vec<String>,
  /// Key used when a request carries none. Normally filled from OPENROUTER_API_KEY.
  #[serde(skip)]
  pub default_api_key: Option<String>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      endpoint: DEFAULT_ENDPOINT.into(),
      model: DEFAULT_MODEL.into(),
      timeout_secs: 60,
      user_agent: "SmartTest/1.0".into(),
      referer: "https://github.com/bagdan13040/smarttest".into(),
      title: "SmartTest".into(),
      fallback_ips: vec!["104.18.2.115".into(), "104.18.3.115".into()],
      default_api_key: None,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  pub data_dir: PathBuf,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self { data_dir: PathBuf::from("./data") }
  }
}

/// Prompts used by the LLM client. Placeholders are `{name}` (see `util::fill_template`).
/// You can override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Theory + multiple-choice course
  pub course_system: String,
  pub course_user_template: String,
  // Open-ended questions
  pub open_questions_system: String,
  pub open_questions_user_template: String,
  // Free-text answer grading
  pub evaluation_system: String,
  pub evaluation_user_template: String,
  // Follow-up topic suggestions
  pub next_topics_system: String,
  pub next_topics_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      course_system: "You are an API that returns raw JSON only. Format text with Kivy markup ([b], [i], [color]) instead of Markdown.".into(),
      course_user_template: "Topic: '{topic}'. Difficulty: '{difficulty}'. \
1. Write an EXTENSIVE and DETAILED theory text. \
Split the text into logical sections with headings. \
Use [b]...[/b] tags for bold text and \\n line breaks for formatting. \
Do NOT use Markdown (**, ##). \
2. Generate exactly 10 questions with 4 answer options each. \
Return ONLY a JSON object. \
Structure: {\"theory\": \"Theory text...\", \"questions\": [{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \"answer\": 0}]}".into(),
      open_questions_system: "You are an API that returns raw JSON only. You write open-ended study questions.".into(),
      open_questions_user_template: "Topic: '{topic}'. Difficulty: '{difficulty}'. \
Write {n} open-ended questions that require a short written answer and check understanding, not recall. \
For each question add grading notes: the key points a good answer must mention. \
Return ONLY a JSON array: [{\"question\": \"...\", \"notes\": \"...\"}]".into(),
      evaluation_system: "You are a fair but strict examiner. Reply with raw JSON only.".into(),
      evaluation_user_template: "Question: {question}\nGrading notes: {notes}\nStudent answer: {answer}\n\n\
Grade the answer from 0 to 10. \
Return ONLY JSON: {\"score\": 0, \"max_score\": 10, \"commentary\": \"...\", \"suggested_improvements\": \"...\"}".into(),
      next_topics_system: "You are a study planner. Reply with raw JSON only.".into(),
      next_topics_user_template: "The student has just studied this material:\n{material}\n\n\
Suggest {n} short topic titles to study next that deepen or extend it. \
Return ONLY a JSON array of strings.".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from SMARTTEST_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("SMARTTEST_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "smarttest_backend", %path, "Loaded backend config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "smarttest_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "smarttest_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// TOML config (or defaults) with environment overrides applied.
pub fn load_config() -> AgentConfig {
  let mut cfg = load_agent_config_from_env().unwrap_or_default();
  apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
  cfg
}

fn apply_env_overrides(cfg: &mut AgentConfig, var: impl Fn(&str) -> Option<String>) {
  let non_blank = |k: &str| var(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
  if let Some(key) = non_blank("OPENROUTER_API_KEY") {
    cfg.api.default_api_key = Some(key);
  }
  if let Some(model) = non_blank("OPENROUTER_MODEL") {
    cfg.api.model = model;
  }
  if let Some(dir) = non_blank("SMARTTEST_DATA_DIR") {
    cfg.storage.data_dir = PathBuf::from(dir);
  }
}
