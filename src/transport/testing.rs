//! Test doubles: scripted transports and a local chat-completion stub server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{json, Value};

use super::{PostRequest, Transport, TransportError};

/// Transport replaying a fixed outcome and counting calls.
pub struct FakeTransport {
  name: String,
  outcomes: Mutex<Vec<Result<Value, TransportError>>>,
  available: bool,
  pub calls: Arc<AtomicUsize>,
  pub last_body: Arc<Mutex<Option<Value>>>,
}

impl FakeTransport {
  pub fn ok(name: &str, body: Value) -> Self {
    Self::scripted(name, vec![Ok(body)])
  }

  pub fn failing(name: &str, err: TransportError) -> Self {
    Self::scripted(name, vec![Err(err)])
  }

  /// Outcomes are consumed in order; the last one repeats.
  pub fn scripted(name: &str, outcomes: Vec<Result<Value, TransportError>>) -> Self {
    Self {
      name: name.to_string(),
      outcomes: Mutex::new(outcomes),
      available: true,
      calls: Arc::new(AtomicUsize::new(0)),
      last_body: Arc::new(Mutex::new(None)),
    }
  }

  pub fn unavailable(mut self) -> Self {
    self.available = false;
    self
  }
}

#[async_trait]
impl Transport for FakeTransport {
  fn name(&self) -> &str {
    &self.name
  }

  fn is_available(&self) -> bool {
    self.available
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.last_body.lock() = Some(req.body.clone());
    let mut outcomes = self.outcomes.lock();
    if outcomes.len() > 1 {
      outcomes.remove(0)
    } else {
      outcomes.first().cloned().unwrap_or_else(|| Err(TransportError::Other("no outcome scripted".into())))
    }
  }
}

pub fn post_request() -> PostRequest {
  PostRequest {
    url: Url::parse("https://example.test/api/v1/chat/completions").unwrap(),
    headers: vec![("Content-Type".into(), "application/json; charset=utf-8".into())],
    body: json!({"model": "m", "messages": []}),
    timeout: Duration::from_secs(5),
  }
}

/// Wrap model text into an OpenAI-shaped completion body.
pub fn completion(content: &str) -> Value {
  json!({
    "id": "gen-1",
    "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
    "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
  })
}

/// Local stand-in for the chat-completion API:
/// - `POST /ok`   echoes the request body and `Host` header inside a completion
/// - `POST /fail` answers 503 with an OpenAI-style error body
/// - `POST /slow` answers after 2 seconds
pub async fn spawn_stub() -> SocketAddr {
  async fn ok(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let host = headers.get("host").and_then(|h| h.to_str().ok()).unwrap_or_default().to_string();
    let title = headers.get("x-title").and_then(|h| h.to_str().ok()).unwrap_or_default().to_string();
    Json(json!({
      "choices": [{"message": {"content": "{}"}}],
      "echo": {"host": host, "title": title, "body": body}
    }))
  }
  async fn fail() -> (StatusCode, Json<Value>) {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": {"message": "upstream overloaded"}})))
  }
  async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({"late": true}))
  }

  let app = Router::new().route("/ok", post(ok)).route("/fail", post(fail)).route("/slow", post(slow));
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  addr
}

pub fn stub_request(addr: SocketAddr, path: &str, timeout: Duration) -> PostRequest {
  PostRequest {
    url: Url::parse(&format!("http://127.0.0.1:{}{}", addr.port(), path)).unwrap(),
    headers: vec![
      ("Content-Type".into(), "application/json; charset=utf-8".into()),
      ("X-Title".into(), "SmartTest".into()),
    ],
    body: json!({"model": "m", "messages": [{"role": "user", "content": "ping"}]}),
    timeout,
  }
}

/// One-shot raw TCP server: reads the request head, writes `response` verbatim, closes.
pub async fn spawn_raw_stub(response: &'static [u8]) -> SocketAddr {
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut buf = vec![0u8; 64 * 1024];
    let _ = sock.read(&mut buf).await;
    let _ = sock.write_all(response).await;
    let _ = sock.shutdown().await;
  });
  addr
}
