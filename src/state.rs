//! Application state: persistent stores, prompts and the LLM client.
//!
//! This module owns:
//!   - the chat-completion client (and through it the transport chain)
//!   - the prompts struct (from TOML or defaults)
//!   - the open-question cache, topic memory and course store under `data_dir`
//!
//! Cloning is cheap; handlers receive a clone per request.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{AgentConfig, Prompts};
use crate::llm::LlmClient;
use crate::store::{CourseStore, OpenQuestionCache, TopicMemory, CACHE_FILE, COURSES_FILE, TOPICS_FILE};
use crate::transport::TransportSelector;

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<LlmClient>,
    pub prompts: Arc<Prompts>,
    pub cache: Arc<OpenQuestionCache>,
    pub topics: Arc<TopicMemory>,
    pub courses: Arc<CourseStore>,
}

impl AppState {
    /// Build state with the production transport chain.
    pub async fn new(cfg: AgentConfig) -> Self {
        let selector = TransportSelector::standard(&cfg.api);
        Self::with_selector(cfg, selector).await
    }

    /// Build state around a given transport selector; stores open under `cfg.storage.data_dir`.
    #[instrument(level = "info", skip_all, fields(data_dir = %cfg.storage.data_dir.display()))]
    pub async fn with_selector(cfg: AgentConfig, selector: TransportSelector) -> Self {
        let dir = &cfg.storage.data_dir;
        let cache = OpenQuestionCache::open(dir.join(CACHE_FILE)).await;
        let topics = TopicMemory::open(dir.join(TOPICS_FILE)).await;
        let courses = CourseStore::open(dir.join(COURSES_FILE)).await;

        info!(
            target: "smarttest_backend",
            cached_question_sets = cache.len().await,
            topics = topics.list().await.len(),
            courses = courses.list().await.len(),
            "Stores loaded"
        );
        if cfg.api.default_api_key.is_some() {
            info!(target: "smarttest_backend", model = %cfg.api.model, "Default API key configured.");
        } else {
            info!(target: "smarttest_backend", model = %cfg.api.model, "No default API key (OPENROUTER_API_KEY); requests must carry one or get offline content.");
        }

        Self {
            llm: Arc::new(LlmClient::new(cfg.api, Arc::new(selector))),
            prompts: Arc::new(cfg.prompts),
            cache: Arc::new(cache),
            topics: Arc::new(topics),
            courses: Arc::new(courses),
        }
    }
}
