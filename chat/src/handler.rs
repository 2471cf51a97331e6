use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderName;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, stream};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::agent::ChatAgent;
use crate::error::ChatError;
use crate::protocol::{ChatRequestBody, STREAM_DONE, UI_MESSAGE_STREAM_HEADER, UiEvent};
use crate::state::AppState;
use crate::tools::ToolRegistry;

const EVENT_BUFFER: usize = 64;

/// `POST /api/chat`: answers the last user message as a stream of UI events.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<Response, ChatError> {
    let Json(body) = body.map_err(|rejection| ChatError::BadRequest(rejection.body_text()))?;
    if body.messages.is_empty() {
        return Err(ChatError::BadRequest(
            "`messages` must contain at least one message".to_string(),
        ));
    }

    let settings = &state.settings;
    let deadline = Instant::now() + settings.request_timeout;
    debug!(messages = body.messages.len(), "chat request");

    let registry = ToolRegistry::sql_tools(Arc::clone(&state.database));
    let agent = ChatAgent::new(
        Arc::clone(&state.model),
        registry,
        settings.max_steps,
        &body.messages,
    );

    let run = tokio::time::timeout_at(deadline, agent.start())
        .await
        .map_err(|_| ChatError::Timeout(settings.request_timeout))??;
    info!(message_id = %run.message_id(), "streaming chat response");

    let (events, receiver) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(run.drive(events, deadline));

    Ok(ui_message_stream(receiver))
}

/// Wraps received events in an SSE response terminated by `[DONE]`.
pub fn ui_message_stream(receiver: mpsc::Receiver<UiEvent>) -> Response {
    let events = ReceiverStream::new(receiver)
        .map(|event| Ok::<Event, Infallible>(sse_event(&event)))
        .chain(stream::once(async {
            Ok::<Event, Infallible>(Event::default().data(STREAM_DONE))
        }));

    (
        [(HeaderName::from_static(UI_MESSAGE_STREAM_HEADER), "v1")],
        Sse::new(events),
    )
        .into_response()
}

fn sse_event(event: &UiEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|err| {
        json!({"type": "error", "errorText": err.to_string()}).to_string()
    });
    Event::default().data(data)
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
