mod chat;
mod config;
mod contracts;
mod errors;
mod facts;
mod llm_client;
mod models;
mod routes;
mod shaping;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::facts::FactStore;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting coach API v{}", env!("CARGO_PKG_VERSION"));

    // Load the fact database
    let facts = match &config.facts_path {
        Some(path) => FactStore::load(path)
            .with_context(|| format!("Failed to load facts from {}", path.display()))?,
        None => FactStore::builtin().context("Built-in fact database is invalid")?,
    };
    info!("Fact database ready ({} facts)", facts.len());

    // Initialize the completion provider
    let llm = LlmClient::new(
        config.provider_url.clone(),
        config.provider_model.clone(),
        config.provider_keys.clone(),
    )?;
    info!(
        "LLM client initialized (model: {}, keys: {})",
        llm.model(),
        config.provider_keys.len()
    );

    if config.cors_origins.is_empty() {
        info!("CORS: no allowlist configured, allowing any origin");
    } else {
        info!("CORS allowlist: {}", config.cors_origins.join(", "));
    }

    // Build app state
    let state = AppState {
        provider: Arc::new(llm),
        facts: Arc::new(facts),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
