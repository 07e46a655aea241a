pub mod health;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, Uri},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::chat::handlers::handle_chat;
use crate::config::Config;
use crate::errors::AppError;
use crate::facts::handlers::{handle_facts, handle_plan};
use crate::state::AppState;

/// CORS for the browser widget: the configured allowlist, or any origin when
/// the list is empty.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-req-id"),
        ]);

    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Unknown paths get the same JSON error body as every other failure.
async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        // GET routes also answer HEAD
        .route("/health", get(health::health_handler))
        .route("/version", get(health::version_handler))
        .route("/facts", post(handle_facts))
        .route("/plan", post(handle_plan))
        .route("/chat", post(handle_chat))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}
