//! KidsLearn · Study Companion Backend
//!
//! - Axum HTTP + WebSocket API, one learner session per client
//! - Streams question sets from an OpenAI-compatible service and derives quiz,
//!   flashcards and matching content from them
//! - Matching, letter and alphabet games with durable per-learner scores
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   OPENAI_API_KEY    : enables question generation if present
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   LEARN_CONFIG_PATH : path to TOML config (prompts, limits, game timings)
//!   DATA_DIR          : directory for the JSON learner store (memory only if unset)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod encoder;
mod partial;
mod validator;
mod derive;
mod openai;
mod pipeline;
mod session;
mod matching;
mod letters;
mod exercises;
mod practice;
mod store;
mod history;
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

  // Build shared application state (config, learner store, generation client).
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
  info!(target: "kidslearn_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "kidslearn_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "kidslearn_backend", error = %e, "Failed to listen for shutdown signal");
  }
}
