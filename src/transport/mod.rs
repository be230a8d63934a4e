//! Multi-strategy HTTP POST with graceful degradation.
//!
//! A `TransportSelector` owns an ordered chain of `Transport` strategies and
//! tries them one after another for a single request:
//!
//! 1. `native`   - pooled client on the OS trust store (mobile/desktop OSes only)
//! 2. `bridge`   - callback-style request awaited through a per-call channel
//! 3. `blocking` - plain blocking client, TLS verification off
//!
//! When the last chain strategy fails with a DNS error, the IP-literal
//! strategies from `bypass` are tried (forced `Host` header, then raw TLS with
//! forced SNI). Every failure is collected; the selector only gives up once
//! everything was tried, reporting all collected messages at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ApiConfig;

pub mod blocking;
pub mod bridge;
pub mod bypass;
pub mod error;
pub mod native;

#[cfg(test)]
pub(crate) mod testing;

pub use error::TransportError;

/// One outbound POST. Cloned into strategies that need ownership.
#[derive(Clone, Debug)]
pub struct PostRequest {
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Value,
  /// Budget of a single attempt.
  pub timeout: Duration,
}

impl PostRequest {
  pub fn body_bytes(&self) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(&self.body).map_err(|e| TransportError::Other(format!("cannot serialize body: {e}")))
  }

  /// `host[:port]` as it should appear in a `Host` header.
  pub fn host_header(&self) -> Option<String> {
    let host = self.url.host_str()?;
    Some(match self.url.port() {
      Some(p) => format!("{host}:{p}"),
      None => host.to_string(),
    })
  }
}

/// A concrete way of performing the POST.
#[async_trait]
pub trait Transport: Send + Sync {
  fn name(&self) -> &str;

  /// Unavailable strategies are skipped without recording an error.
  fn is_available(&self) -> bool {
    true
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError>;
}

/// Successful outcome of `TransportSelector::execute`.
#[derive(Debug)]
pub struct Delivered {
  pub body: Value,
  pub transport: String,
  /// `"<strategy>: <error>"` for every strategy that failed before this one.
  pub errors: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectorError {
  #[error("no transport strategy is available")]
  NoTransport,

  #[error("all HTTP transports failed: {}", errors.join("; "))]
  Exhausted { errors: Vec<String> },
}

pub struct TransportSelector {
  chain: Vec<Arc<dyn Transport>>,
  dns_fallbacks: Vec<Arc<dyn Transport>>,
  calls: AtomicUsize,
}

impl TransportSelector {
  pub fn new(chain: Vec<Arc<dyn Transport>>, dns_fallbacks: Vec<Arc<dyn Transport>>) -> Self {
    Self { chain, dns_fallbacks, calls: AtomicUsize::new(0) }
  }

  /// The production chain: native, bridge, blocking, then IP fallbacks.
  pub fn standard(api: &ApiConfig) -> Self {
    let mut chain: Vec<Arc<dyn Transport>> = vec![Arc::new(native::NativeTransport::new())];
    match bridge::BridgeTransport::new() {
      Ok(t) => chain.push(Arc::new(t)),
      Err(e) => warn!(target: "transport", error = %e, "bridge transport could not be built; leaving it out"),
    }
    chain.push(Arc::new(blocking::BlockingTransport));

    let dns_fallbacks = bypass::ip_fallback_strategies(&api.fallback_ips);
    info!(
      target: "transport",
      chain = ?chain.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
      ip_fallbacks = dns_fallbacks.len(),
      "Transport chain ready"
    );
    Self::new(chain, dns_fallbacks)
  }

  /// Number of `execute` invocations so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::Relaxed)
  }

  #[instrument(level = "info", skip(self, req), fields(url = %req.url))]
  pub async fn execute(&self, req: &PostRequest) -> Result<Delivered, SelectorError> {
    self.calls.fetch_add(1, Ordering::Relaxed);
    let mut errors = Vec::new();
    let mut last_error: Option<TransportError> = None;

    for t in &self.chain {
      if let Some(body) = attempt(t.as_ref(), req, &mut errors, &mut last_error).await {
        return Ok(Delivered { body, transport: t.name().to_string(), errors });
      }
    }

    if last_error.as_ref().is_some_and(TransportError::is_dns) {
      info!(target: "transport", fallbacks = self.dns_fallbacks.len(), "DNS failure; trying IP-literal fallbacks");
      for t in &self.dns_fallbacks {
        if let Some(body) = attempt(t.as_ref(), req, &mut errors, &mut last_error).await {
          return Ok(Delivered { body, transport: t.name().to_string(), errors });
        }
      }
    } else if !self.dns_fallbacks.is_empty() {
      debug!(target: "transport", "Last failure was not DNS-related; IP fallbacks skipped");
    }

    if errors.is_empty() {
      Err(SelectorError::NoTransport)
    } else {
      warn!(target: "transport", attempts = errors.len(), "All transports failed");
      Err(SelectorError::Exhausted { errors })
    }
  }
}

async fn attempt(
  t: &dyn Transport,
  req: &PostRequest,
  errors: &mut Vec<String>,
  last_error: &mut Option<TransportError>,
) -> Option<Value> {
  if !t.is_available() {
    debug!(target: "transport", strategy = t.name(), "Strategy not available here; skipping");
    return None;
  }
  let start = Instant::now();
  match t.post(req).await {
    Ok(body) => {
      info!(target: "transport", strategy = t.name(), elapsed = ?start.elapsed(), "Request delivered");
      Some(body)
    }
    Err(e) => {
      warn!(target: "transport", strategy = t.name(), elapsed = ?start.elapsed(), error = %e, "Strategy failed");
      errors.push(format!("{}: {}", t.name(), e));
      *last_error = Some(e);
      None
    }
  }
}

/// Copy request headers and body onto a reqwest builder.
pub(crate) fn prepare(
  mut rb: reqwest::RequestBuilder,
  req: &PostRequest,
  body: Vec<u8>,
) -> reqwest::RequestBuilder {
  for (k, v) in &req.headers {
    rb = rb.header(k.as_str(), v.as_str());
  }
  rb.timeout(req.timeout).body(body)
}

/// Send a prepared async request and decode the answer.
pub(crate) async fn send_and_decode(rb: reqwest::RequestBuilder, timeout: Duration) -> Result<Value, TransportError> {
  let resp = rb.send().await.map_err(|e| error::classify_reqwest(&e, timeout))?;
  let status = resp.status().as_u16();
  let bytes = resp.bytes().await.map_err(|e| error::classify_reqwest(&e, timeout))?;
  error::decode_response(status, &bytes)
}
