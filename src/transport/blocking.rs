//! Last-resort strategy: a blocking client on a worker thread, TLS verification off.
//!
//! Exists for devices whose trust stores are stale or broken. Anything the
//! chain sends here may be intercepted; it is only reached after the verified
//! strategies failed.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::error::{classify_reqwest, decode_response};
use super::{PostRequest, Transport, TransportError};

pub struct BlockingTransport;

fn post_blocking(req: &PostRequest) -> Result<Value, TransportError> {
  let client = reqwest::blocking::Client::builder()
    .use_rustls_tls()
    .danger_accept_invalid_certs(true)
    .timeout(req.timeout)
    .build()
    .map_err(|e| TransportError::Unavailable(e.to_string()))?;

  let mut rb = client.post(req.url.clone());
  for (k, v) in &req.headers {
    rb = rb.header(k.as_str(), v.as_str());
  }
  let resp = rb.body(req.body_bytes()?).send().map_err(|e| classify_reqwest(&e, req.timeout))?;
  let status = resp.status().as_u16();
  let bytes = resp.bytes().map_err(|e| classify_reqwest(&e, req.timeout))?;
  debug!(target: "transport", status, len = bytes.len(), "blocking: response read");
  decode_response(status, &bytes)
}

#[async_trait]
impl Transport for BlockingTransport {
  fn name(&self) -> &str {
    "blocking"
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError> {
    let req = req.clone();
    tokio::task::spawn_blocking(move || post_blocking(&req))
      .await
      .map_err(|e| TransportError::Other(format!("blocking worker failed: {e}")))?
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::transport::testing::{spawn_stub, stub_request};

  #[tokio::test]
  async fn posts_from_a_worker_thread() {
    let addr = spawn_stub().await;
    let body = BlockingTransport.post(&stub_request(addr, "/ok", Duration::from_secs(5))).await.unwrap();
    assert_eq!(body["echo"]["host"], format!("127.0.0.1:{}", addr.port()));
    assert_eq!(body["echo"]["body"]["messages"][0]["content"], "ping");
  }

  #[tokio::test]
  async fn reports_status_failures() {
    let addr = spawn_stub().await;
    let err = BlockingTransport.post(&stub_request(addr, "/fail", Duration::from_secs(5))).await.unwrap_err();
    assert_eq!(err, TransportError::Status { status: 503, body: "upstream overloaded".into() });
  }

  #[tokio::test]
  async fn refused_connection_is_not_dns() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = BlockingTransport.post(&stub_request(addr, "/ok", Duration::from_secs(2))).await.unwrap_err();
    assert!(!err.is_dns(), "{err}");
  }
}
