//! The `/api/chat` service: turns a conversation into SQL tool calls against
//! the sales database and streams the assistant's answer back.

pub mod agent;
pub mod error;
pub mod handler;
pub mod prompt;
pub mod protocol;
pub mod state;
pub mod tools;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use agent::{ChatAgent, ChatRun};
pub use error::ChatError;
pub use protocol::{ChatRequestBody, ErrorReply, Part, ToolPart, ToolState, UiEvent, UiMessage, UiRole};
pub use state::{AppState, ChatSettings};
pub use tools::ToolRegistry;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.settings.cors_allowed_origins.as_deref());
    Router::new()
        .route("/api/chat", post(handler::chat))
        .route("/health", get(handler::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Restricts origins to the comma separated `allowed` list, or allows any
/// origin when the list is unset or has no valid entries.
#[must_use]
pub fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
