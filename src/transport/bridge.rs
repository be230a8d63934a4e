//! Callback-style asynchronous requests, bridged to a single awaited result.
//!
//! `CallbackRequest` follows the event-loop HTTP APIs found in UI toolkits:
//! it returns immediately and later reports through `on_success`,
//! `on_failure` (non-2xx), `on_error` (no response) and `on_progress`.
//! `BridgeTransport` turns that into one `Result` by handing the callbacks a
//! single-use channel owned by the call, so overlapping calls never share
//! completion state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::error::{classify_reqwest, decode_response, TransportError};
use super::{prepare, PostRequest, Transport};

type Outcome = Result<Value, TransportError>;

/// Upper bound on the buffer reserved from an untrusted `Content-Length`.
const PREALLOC_LIMIT: u64 = 64 * 1024;

pub struct Callbacks {
  pub on_success: Box<dyn FnOnce(u16, Value) + Send>,
  pub on_failure: Box<dyn FnOnce(u16, TransportError) + Send>,
  pub on_error: Box<dyn FnOnce(TransportError) + Send>,
  pub on_progress: Box<dyn FnMut(u64, Option<u64>) + Send>,
}

pub struct CallbackRequest;

impl CallbackRequest {
  /// Start the request on a driver task. Exactly one of the terminal callbacks runs.
  pub fn spawn(client: reqwest::Client, req: PostRequest, cb: Callbacks) -> JoinHandle<()> {
    tokio::spawn(drive(client, req, cb))
  }
}

async fn drive(client: reqwest::Client, req: PostRequest, cb: Callbacks) {
  let Callbacks { on_success, on_failure, on_error, mut on_progress } = cb;

  let body = match req.body_bytes() {
    Ok(b) => b,
    Err(e) => return on_error(e),
  };
  let mut resp = match prepare(client.post(req.url.clone()), &req, body).send().await {
    Ok(r) => r,
    Err(e) => return on_error(classify_reqwest(&e, req.timeout)),
  };

  let status = resp.status().as_u16();
  let total = resp.content_length();
  let mut buf: Vec<u8> = Vec::with_capacity(total.unwrap_or(0).min(PREALLOC_LIMIT) as usize);
  loop {
    match resp.chunk().await {
      Ok(Some(chunk)) => {
        buf.extend_from_slice(&chunk);
        on_progress(buf.len() as u64, total);
      }
      Ok(None) => break,
      Err(e) => return on_error(classify_reqwest(&e, req.timeout)),
    }
  }

  match decode_response(status, &buf) {
    Ok(json) => on_success(status, json),
    Err(e @ TransportError::Status { .. }) => on_failure(status, e),
    Err(e) => on_error(e),
  }
}

pub struct BridgeTransport {
  client: reqwest::Client,
}

impl BridgeTransport {
  pub fn new() -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .use_rustls_tls()
      .build()
      .map_err(|e| TransportError::Unavailable(e.to_string()))?;
    Ok(Self { client })
  }
}

/// Deliver the outcome once; later calls find the slot empty.
fn complete(slot: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
  if let Some(tx) = slot.lock().take() {
    let _ = tx.send(outcome);
  }
}

#[async_trait]
impl Transport for BridgeTransport {
  fn name(&self) -> &str {
    "bridge"
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError> {
    let (tx, rx) = oneshot::channel::<Outcome>();
    let slot = Arc::new(Mutex::new(Some(tx)));

    let callbacks = Callbacks {
      on_success: {
        let slot = slot.clone();
        Box::new(move |status: u16, body: Value| {
          debug!(target: "transport", status, "bridge: success");
          complete(&slot, Ok(body));
        })
      },
      on_failure: {
        let slot = slot.clone();
        Box::new(move |status: u16, err: TransportError| {
          debug!(target: "transport", status, "bridge: failure");
          complete(&slot, Err(err));
        })
      },
      on_error: {
        let slot = slot.clone();
        Box::new(move |err: TransportError| {
          debug!(target: "transport", error = %err, "bridge: error");
          complete(&slot, Err(err));
        })
      },
      on_progress: Box::new(|received: u64, total: Option<u64>| {
        trace!(target: "transport", received, total = ?total, "bridge: progress");
      }),
    };

    let handle = CallbackRequest::spawn(self.client.clone(), req.clone(), callbacks);
    wait_for(rx, handle, req.timeout).await
  }
}

async fn wait_for(rx: oneshot::Receiver<Outcome>, handle: JoinHandle<()>, timeout: Duration) -> Outcome {
  match tokio::time::timeout(timeout, rx).await {
    Ok(Ok(outcome)) => outcome,
    Ok(Err(_)) => Err(TransportError::Other("request driver stopped without reporting".into())),
    Err(_) => {
      handle.abort();
      Err(TransportError::Timeout(timeout))
    }
  }
}
