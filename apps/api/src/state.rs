use std::sync::Arc;

use crate::config::Config;
use crate::facts::FactStore;
use crate::llm_client::CompletionProvider;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Everything here is read-only after startup; turns share nothing mutable.
#[derive(Clone)]
pub struct AppState {
    /// Completion provider. `LlmClient` in production, scripted fakes in tests.
    pub provider: Arc<dyn CompletionProvider>,
    pub facts: Arc<FactStore>,
    pub config: Config,
}
