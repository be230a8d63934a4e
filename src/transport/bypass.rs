//! IP-literal strategies used when the API host name cannot be resolved.
//!
//! For each configured IP two strategies are produced, in this order:
//! `host-header@<ip>` (high-level client against the IP, real host in the
//! `Host` header, certificate checks off) and `sni@<ip>` (raw TCP + TLS with
//! SNI set to the real host name, validated against webpki roots, HTTP/1.1
//! spoken directly over the stream).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::error::{classify_io, decode_response};
use super::{prepare, send_and_decode, PostRequest, Transport, TransportError};

/// Build the per-IP strategies. Invalid IP literals are logged and skipped.
pub fn ip_fallback_strategies(ips: &[String]) -> Vec<Arc<dyn Transport>> {
  let tls = match tls_client_config() {
    Ok(cfg) => Some(cfg),
    Err(e) => {
      warn!(target: "transport", error = %e, "TLS config for SNI fallback unavailable");
      None
    }
  };

  let mut out: Vec<Arc<dyn Transport>> = Vec::new();
  for raw in ips {
    let ip: IpAddr = match raw.trim().parse() {
      Ok(ip) => ip,
      Err(_) => {
        warn!(target: "transport", ip = %raw, "Ignoring invalid fallback IP");
        continue;
      }
    };
    match HostHeaderTransport::new(ip) {
      Ok(t) => out.push(Arc::new(t)),
      Err(e) => warn!(target: "transport", %ip, error = %e, "host-header strategy could not be built"),
    }
    if let Some(cfg) = &tls {
      out.push(Arc::new(SniTransport::new(ip, cfg.clone())));
    }
  }
  out
}

fn tls_client_config() -> Result<Arc<ClientConfig>, rustls::Error> {
  let mut roots = RootCertStore::empty();
  roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
  let mut cfg = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
  cfg.alpn_protocols = vec![b"http/1.1".to_vec()];
  Ok(Arc::new(cfg))
}

fn target_port(req: &PostRequest) -> u16 {
  req.url.port_or_known_default().unwrap_or(443)
}

fn real_host(req: &PostRequest) -> Result<String, TransportError> {
  req.url.host_str().map(str::to_string).ok_or_else(|| TransportError::Other(format!("URL has no host: {}", req.url)))
}

pub struct HostHeaderTransport {
  ip: IpAddr,
  name: String,
  client: reqwest::Client,
}

impl HostHeaderTransport {
  pub fn new(ip: IpAddr) -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .use_rustls_tls()
      .danger_accept_invalid_certs(true)
      .build()
      .map_err(|e| TransportError::Unavailable(e.to_string()))?;
    Ok(Self { ip, name: format!("host-header@{ip}"), client })
  }
}

#[async_trait]
impl Transport for HostHeaderTransport {
  fn name(&self) -> &str {
    &self.name
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError> {
    let host = req.host_header().ok_or_else(|| TransportError::Other(format!("URL has no host: {}", req.url)))?;
    let mut url = req.url.clone();
    url
      .set_ip_host(self.ip)
      .map_err(|_| TransportError::Other(format!("cannot address {} by IP", req.url)))?;

    debug!(target: "transport", strategy = %self.name, %host, "POST via IP literal");
    let rb = prepare(self.client.post(url), req, req.body_bytes()?).header("Host", host);
    send_and_decode(rb, req.timeout).await
  }
}

pub struct SniTransport {
  ip: IpAddr,
  name: String,
  tls: Arc<ClientConfig>,
}

impl SniTransport {
  pub fn new(ip: IpAddr, tls: Arc<ClientConfig>) -> Self {
    Self { ip, name: format!("sni@{ip}"), tls }
  }

  async fn exchange(&self, req: &PostRequest) -> Result<Value, TransportError> {
    let addr = SocketAddr::new(self.ip, target_port(req));
    let tcp = TcpStream::connect(addr).await.map_err(|e| classify_io(&e, req.timeout))?;

    if req.url.scheme() != "https" {
      return http1_post(tcp, req).await;
    }

    let server_name = ServerName::try_from(real_host(req)?)
      .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;
    let stream = TlsConnector::from(self.tls.clone())
      .connect(server_name, tcp)
      .await
      .map_err(|e| TransportError::Tls(super::error::error_chain_text(&e)))?;
    http1_post(stream, req).await
  }
}

#[async_trait]
impl Transport for SniTransport {
  fn name(&self) -> &str {
    &self.name
  }

  async fn post(&self, req: &PostRequest) -> Result<Value, TransportError> {
    debug!(target: "transport", strategy = %self.name, "POST over raw socket");
    tokio::time::timeout(req.timeout, self.exchange(req))
      .await
      .map_err(|_| TransportError::Timeout(req.timeout))?
  }
}

/// One HTTP/1.1 POST over an already connected stream.
async fn http1_post<S>(io: S, req: &PostRequest) -> Result<Value, TransportError>
where
  S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
    .await
    .map_err(|e| TransportError::Connect(e.to_string()))?;
  tokio::spawn(async move {
    if let Err(e) = conn.await {
      debug!(target: "transport", error = %e, "raw connection closed with error");
    }
  });

  let path = match req.url.query() {
    Some(q) => format!("{}?{}", req.url.path(), q),
    None => req.url.path().to_string(),
  };
  let host = req.host_header().ok_or_else(|| TransportError::Other(format!("URL has no host: {}", req.url)))?;
  let body = req.body_bytes()?;

  let mut builder = hyper::Request::post(path).header("Host", host);
  for (k, v) in &req.headers {
    builder = builder.header(k.as_str(), v.as_str());
  }
  let request = builder
    .body(Full::new(Bytes::from(body)))
    .map_err(|e| TransportError::Other(format!("cannot build request: {e}")))?;

  let resp = sender.send_request(request).await.map_err(|e| TransportError::Connect(e.to_string()))?;
  let status = resp.status().as_u16();
  let bytes = resp
    .into_body()
    .collect()
    .await
    .map_err(|e| TransportError::Decode(e.to_string()))?
    .to_bytes();
  decode_response(status, &bytes)
}
