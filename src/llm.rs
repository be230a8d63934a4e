//! OpenRouter chat-completion client on top of the transport selector.
//!
//! Calls are instrumented and log model names, latencies, the delivering
//! strategy and response sizes (not contents).
//!
//! NOTE: We never log the API key (only `mask_key` output at debug level).

use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ApiConfig;
use crate::prompt::ChatCompletionRequest;
use crate::transport::{PostRequest, SelectorError, TransportSelector};
use crate::util::mask_key;
use crate::validate::{extract_content, InvalidReason};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LlmError {
  #[error("invalid endpoint URL '{0}'")]
  Endpoint(String),

  #[error("cannot encode request: {0}")]
  Encode(String),

  #[error(transparent)]
  Transport(#[from] SelectorError),

  #[error(transparent)]
  Content(#[from] InvalidReason),
}

pub struct LlmClient {
  api: ApiConfig,
  selector: Arc<TransportSelector>,
}

impl LlmClient {
  pub fn new(api: ApiConfig, selector: Arc<TransportSelector>) -> Self {
    Self { api, selector }
  }

  pub fn model(&self) -> &str {
    &self.api.model
  }

  pub fn selector(&self) -> &TransportSelector {
    &self.selector
  }

  /// The caller's key when non-blank, else the configured default.
  pub fn resolve_key(&self, explicit: Option<&str>) -> Option<String> {
    explicit
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .map(str::to_string)
      .or_else(|| self.api.default_api_key.clone())
  }

  fn post_request(&self, api_key: &str, body: &ChatCompletionRequest) -> Result<PostRequest, LlmError> {
    let url = Url::parse(&self.api.endpoint).map_err(|_| LlmError::Endpoint(self.api.endpoint.clone()))?;
    let body = serde_json::to_value(body).map_err(|e| LlmError::Encode(e.to_string()))?;
    Ok(PostRequest {
      url,
      headers: vec![
        ("Authorization".into(), format!("Bearer {api_key}")),
        ("Content-Type".into(), "application/json; charset=utf-8".into()),
        ("User-Agent".into(), self.api.user_agent.clone()),
        ("HTTP-Referer".into(), self.api.referer.clone()),
        ("X-Title".into(), self.api.title.clone()),
      ],
      body,
      timeout: self.api.timeout(),
    })
  }

  /// Raw decoded API response.
  #[instrument(level = "info", skip(self, api_key, body), fields(model = %body.model))]
  pub async fn complete(&self, api_key: &str, body: &ChatCompletionRequest) -> Result<Value, LlmError> {
    debug!(target: "smarttest_backend", key = %mask_key(api_key), "Calling chat completion");
    let req = self.post_request(api_key, body)?;
    let start = Instant::now();
    let delivered = self.selector.execute(&req).await.map_err(|e| {
      warn!(target: "smarttest_backend", error = %e, "Chat completion failed on every transport");
      e
    })?;

    if let Some(usage) = delivered.body.get("usage") {
      let tokens = |k: &str| usage.get(k).and_then(serde_json::Value::as_u64);
      let (prompt_tokens, completion_tokens, total_tokens) =
        (tokens("prompt_tokens"), tokens("completion_tokens"), tokens("total_tokens"));
      info!(
        target: "smarttest_backend",
        ?prompt_tokens,
        ?completion_tokens,
        ?total_tokens,
        "OpenRouter usage"
      );
    }
    info!(
      target: "smarttest_backend",
      transport = %delivered.transport,
      failed_before = delivered.errors.len(),
      elapsed_ms = start.elapsed().as_millis() as u64,
      "Chat completion delivered"
    );
    Ok(delivered.body)
  }

  /// Message text of the first choice, code fences stripped.
  pub async fn complete_text(&self, api_key: &str, body: &ChatCompletionRequest) -> Result<String, LlmError> {
    let raw = self.complete(api_key, body).await?;
    let text = extract_content(&raw)?;
    debug!(target: "smarttest_backend", len = text.len(), "Completion text extracted");
    Ok(text)
  }
}
