//! Transport error types and classification of client errors.

use std::error::Error as StdError;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::util::trunc_for_log;

/// Substrings resolvers put into their messages when a host name cannot be resolved.
const DNS_MARKERS: &[&str] = &[
  "dns error",
  "failed to lookup address",
  "name or service not known",
  "nodename nor servname",
  "no address associated",
  "temporary failure in name resolution",
  "getaddrinfo",
  "no such host",
];

/// Failure of one transport strategy for one request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
  /// Host name could not be resolved. Triggers the IP-literal fallbacks.
  #[error("DNS resolution failed: {0}")]
  Dns(String),

  #[error("connection failed: {0}")]
  Connect(String),

  #[error("TLS failure: {0}")]
  Tls(String),

  #[error("timed out after {0:?}")]
  Timeout(Duration),

  /// Non-2xx answer from the API.
  #[error("HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("invalid response body: {0}")]
  Decode(String),

  /// Strategy cannot run on this platform or could not be built.
  #[error("transport unavailable: {0}")]
  Unavailable(String),

  #[error("{0}")]
  Other(String),
}

impl TransportError {
  pub fn is_dns(&self) -> bool {
    matches!(self, TransportError::Dns(_))
  }
}

/// Full `a: b: c` text of an error and its sources.
pub fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
  let mut parts = vec![err.to_string()];
  let mut cur = err.source();
  while let Some(e) = cur {
    let s = e.to_string();
    if !parts.iter().any(|p| p.contains(&s)) {
      parts.push(s);
    }
    cur = e.source();
  }
  parts.join(": ")
}

pub fn looks_like_dns(msg: &str) -> bool {
  let lower = msg.to_lowercase();
  DNS_MARKERS.iter().any(|m| lower.contains(m))
}

/// Map a reqwest error onto the transport taxonomy.
pub fn classify_reqwest(err: &reqwest::Error, timeout: Duration) -> TransportError {
  let text = error_chain_text(err);
  if err.is_timeout() {
    TransportError::Timeout(timeout)
  } else if looks_like_dns(&text) {
    TransportError::Dns(text)
  } else if err.is_decode() || err.is_body() {
    TransportError::Decode(text)
  } else if is_tls_text(&text) {
    TransportError::Tls(text)
  } else if err.is_connect() {
    TransportError::Connect(text)
  } else {
    TransportError::Other(text)
  }
}

/// Map an I/O error (raw sockets) onto the transport taxonomy.
pub fn classify_io(err: &std::io::Error, timeout: Duration) -> TransportError {
  let text = error_chain_text(err);
  match err.kind() {
    std::io::ErrorKind::TimedOut => TransportError::Timeout(timeout),
    _ if looks_like_dns(&text) => TransportError::Dns(text),
    _ if is_tls_text(&text) => TransportError::Tls(text),
    _ => TransportError::Connect(text),
  }
}

fn is_tls_text(text: &str) -> bool {
  let lower = text.to_lowercase();
  lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake")
}

/// Turn a status + raw body into decoded JSON, or the matching error.
pub fn decode_response(status: u16, body: &[u8]) -> Result<Value, TransportError> {
  if !(200..300).contains(&status) {
    let text = String::from_utf8_lossy(body);
    let msg = extract_api_error(&text).unwrap_or_else(|| trunc_for_log(text.trim(), 300));
    return Err(TransportError::Status { status, body: msg });
  }
  serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Try to extract a clean error message from an OpenAI-style error body.
pub fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
