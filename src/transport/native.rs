//! Platform transport: a long-lived pooled client verifying against the OS trust store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{prepare, send_and_decode, PostRequest, Transport, TransportError};

/// Platforms that ship an OS-managed trust store users actually rely on.
pub const fn platform_supported() -> bool {
  cfg!(any(target_os = "android", target_os = "ios", target_os = "macos", target_os = "windows"))
}

pub struct NativeTransport {
  client: Option<reqwest::Client>,
}

impl NativeTransport {
  pub fn new() -> Self {
    if !platform_supported() {
      return Self { client: None };
    }
    let built = reqwest::Client::builder()
      .use_rustls_tls()
      .tls_built_in_root_certs(true)
      .pool_idle_timeout(Duration::from_secs(90))
      .tcp_keepalive(Duration::from_secs(30))
      .build();
    match built {
      Ok(client) => Self { client: Some(client) },
      Err(e) => {
        warn!(target: "transport", error = %e, "native client could not be built");
        Self { client: None }
      }
    }
  }
}

impl Default for NativeTransport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Transport for NativeTransport {
  fn name(&self) -> &str {
    "native"
  }

  fn is_available(&self) -> bool {
    self.client.is_some()
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError> {
    let client = self
      .client
      .as_ref()
      .ok_or_else(|| TransportError::Unavailable("native client not available on this platform".into()))?;
    let rb = prepare(client.post(req.url.clone()), req, req.body_bytes()?);
    send_and_decode(rb, req.timeout).await
  }
}
