//! PrepForge · Adaptive Exam Practice Backend
//!
//! - Axum HTTP + WebSocket API
//! - Adaptive question selection from learner ability and item difficulty
//! - Optional xAI question generation (via environment variables)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   XAI_API_KEY           : enables question generation if present
//!   XAI_BASE_URL          : default "https://api.x.ai/v1"
//!   XAI_MODEL             : default "grok-2-1212"
//!   PREPFORGE_CONFIG_PATH : path to TOML config (engine tuning, prompts, question bank)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod seeds;
mod retry;
mod store;
mod cache;
mod ability;
mod difficulty;
mod selector;
mod generator;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (stores, selector, generator, prompts).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "prepforge_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "prepforge_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "prepforge_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "prepforge_backend", "Shutdown signal received");
}
