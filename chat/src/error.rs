use std::time::Duration;

use ai::ModelError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::protocol::{ErrorReply, UiRole};

pub const RATE_LIMIT_REPLY: &str =
    "⚠️ You are being rate limited. Please wait a few seconds and try again.";

/// Failures of a chat request that happen before the event stream starts.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("the model did not respond within {} seconds", .0.as_secs())]
    Timeout(Duration),
}

impl ChatError {
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ChatError::Model(err) if err.is_rate_limit())
    }

    /// Text shown to the user in place of an assistant answer.
    #[must_use]
    pub fn assistant_reply(&self) -> String {
        if self.is_rate_limit() {
            return RATE_LIMIT_REPLY.to_string();
        }
        let message = match self {
            ChatError::Model(err) => err.message().to_string(),
            other => other.to_string(),
        };
        let message = if message.trim().is_empty() {
            "Something went wrong."
        } else {
            message.as_str()
        };
        format!("❌ Unexpected error: {message}")
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::BadRequest(message) = self {
            warn!(%message, "rejected chat request");
            return (StatusCode::BAD_REQUEST, message).into_response();
        }

        if self.is_rate_limit() {
            warn!(error = %self, "model provider is rate limiting");
        } else {
            error!(error = %self, "chat request failed");
        }

        let reply = ErrorReply {
            role: UiRole::Assistant,
            content: self.assistant_reply(),
        };
        (StatusCode::OK, Json(reply)).into_response()
    }
}
