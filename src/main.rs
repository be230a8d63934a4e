//! SmartTest · Course Generator Backend
//!
//! - Axum HTTP API consumed by the SmartTest mobile client
//! - OpenRouter chat completions through a fallback chain of transports
//! - JSON-file stores for courses, open-question cache and topic memory
//!
//! Important env variables (a `.env` file is read too):
//!   PORT                  : u16 (default 3000)
//!   OPENROUTER_API_KEY    : default key for requests that carry none
//!   OPENROUTER_MODEL      : default "google/gemma-3-1b-it:free"
//!   SMARTTEST_DATA_DIR    : where the JSON stores live (default "./data")
//!   SMARTTEST_CONFIG_PATH : path to TOML config ([api], [storage], [prompts])
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use smarttest_backend::config::load_config;
use smarttest_backend::routes::build_router;
use smarttest_backend::state::AppState;
use smarttest_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let dotenv = dotenvy::dotenv();
  telemetry::init_tracing();
  if let Ok(path) = dotenv {
    info!(target: "smarttest_backend", path = %path.display(), "Loaded .env");
  }

  // Shared application state (stores, prompts, LLM client + transport chain).
  let cfg = load_config();
  let state = Arc::new(AppState::new(cfg).await);

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "smarttest_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "smarttest_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "smarttest_backend", error = %e, "Cannot listen for Ctrl-C; running until killed");
    std::future::pending::<()>().await;
  }
  info!(target: "smarttest_backend", "Shutdown requested");
}
