use std::sync::{Arc, Mutex};
use std::time::Duration;

use ai::{ChunkStream, CompletionRequest, ModelClient, ModelError, StreamChunk, ToolCallInfo};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chat::{AppState, ChatSettings, ErrorReply, UiEvent, UiMessage, UiRole};
use db::SqliteDatabase;
use futures::{StreamExt, stream};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Replays one scripted step per model call.
#[derive(Debug)]
struct ScriptedModel {
    steps: Mutex<Vec<Result<Vec<StreamChunk>, ModelError>>>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    fn new(steps: Vec<Result<Vec<StreamChunk>, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().rev().collect()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn stream_completion(&self, _request: CompletionRequest) -> Result<ChunkStream, ModelError> {
        *self.calls.lock().unwrap() += 1;
        let step = self.steps.lock().unwrap().pop().unwrap_or(Ok(vec![]));
        step.map(|chunks| stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}

fn tool_call(id: &str, name: &str, arguments: Value) -> StreamChunk {
    StreamChunk::ToolCall(ToolCallInfo {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    })
}

async fn app(model: Arc<ScriptedModel>) -> axum::Router {
    let database = SqliteDatabase::in_memory().await.unwrap();
    database.bootstrap(true).await.unwrap();
    let settings = ChatSettings {
        request_timeout: Duration::from_secs(10),
        ..ChatSettings::default()
    };
    chat::router(Arc::new(AppState::new(model, Arc::new(database), settings)))
}

fn chat_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn question(text: &str) -> Request<Body> {
    let body = json!({"messages": [UiMessage::user("u1", text)]});
    chat_request(body.to_string())
}

/// Splits an SSE body into its `data:` payloads.
fn data_lines(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn answers_with_tool_call_and_streamed_text() {
    let model = ScriptedModel::new(vec![
        Ok(vec![tool_call(
            "call_1",
            "db",
            json!({"query": "SELECT COUNT(*) AS count FROM products WHERE category = 'Electronics'"}),
        )]),
        Ok(vec![
            StreamChunk::Text("There are ".to_string()),
            StreamChunk::Text("3 products in Electronics.".to_string()),
        ]),
    ]);
    let response = app(model.clone())
        .await
        .oneshot(question("How many products are in category Electronics?"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["x-vercel-ai-ui-message-stream"],
        "v1"
    );
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let payloads = data_lines(&body_text(response).await);
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));

    let events: Vec<UiEvent> = payloads[..payloads.len() - 1]
        .iter()
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert!(matches!(events.first(), Some(UiEvent::Start { .. })));
    assert_eq!(events.last(), Some(&UiEvent::Finish));
    assert!(events.contains(&UiEvent::ToolOutputAvailable {
        tool_call_id: "call_1".to_string(),
        output: json!("count: 3"),
    }));

    let mut answer = UiMessage::assistant("a1");
    for event in &events {
        answer.apply_event(event);
    }
    assert_eq!(answer.text(), "There are 3 products in Electronics.");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn database_errors_are_returned_to_the_model() {
    let model = ScriptedModel::new(vec![
        Ok(vec![tool_call("call_1", "db", json!({"query": "SELECT * FROM customers"}))]),
        Ok(vec![StreamChunk::Text("That table does not exist.".to_string())]),
    ]);
    let response = app(model).await.oneshot(question("List customers")).await.unwrap();
    let body = body_text(response).await;

    let output = data_lines(&body)
        .iter()
        .filter_map(|data| serde_json::from_str::<UiEvent>(data).ok())
        .find_map(|event| match event {
            UiEvent::ToolOutputAvailable { output, .. } => Some(output),
            _ => None,
        })
        .unwrap();
    let output = output.as_str().unwrap();
    assert!(output.starts_with("❌ Database Error: "));
    assert!(output.contains("no such table"));
}

#[tokio::test]
async fn tool_loop_stops_after_five_steps() {
    let steps = (0..8)
        .map(|i| Ok(vec![tool_call(&format!("call_{i}"), "schema", json!({}))]))
        .collect();
    let model = ScriptedModel::new(steps);
    let response = app(model.clone()).await.oneshot(question("Loop forever")).await.unwrap();
    let body = body_text(response).await;

    let tool_inputs = data_lines(&body)
        .iter()
        .filter(|data| data.contains("\"tool-input-available\""))
        .count();
    assert_eq!(tool_inputs, 5);
    assert_eq!(model.calls(), 5);
    assert!(body.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn rate_limits_become_an_assistant_reply() {
    let model = ScriptedModel::new(vec![Err(ModelError::Status {
        status: 429,
        message: "Too Many Requests".to_string(),
    })]);
    let response = app(model).await.oneshot(question("hi")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let reply: ErrorReply = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(reply.role, UiRole::Assistant);
    assert_eq!(
        reply.content,
        "⚠️ You are being rate limited. Please wait a few seconds and try again."
    );
}

/// Opens fine, then reports the failure as the first streamed item.
#[derive(Debug)]
struct FailsInFirstChunk;

#[async_trait]
impl ModelClient for FailsInFirstChunk {
    async fn stream_completion(&self, _request: CompletionRequest) -> Result<ChunkStream, ModelError> {
        Ok(stream::iter(vec![Err(ModelError::Status {
            status: 429,
            message: "Rate limit exceeded".to_string(),
        })])
        .boxed())
    }
}

#[tokio::test]
async fn rate_limits_in_the_first_chunk_become_an_assistant_reply() {
    let database = SqliteDatabase::in_memory().await.unwrap();
    database.bootstrap(true).await.unwrap();
    let state = AppState::new(Arc::new(FailsInFirstChunk), Arc::new(database), ChatSettings::default());
    let response = chat::router(Arc::new(state))
        .oneshot(question("hi"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-vercel-ai-ui-message-stream").is_none());
    let reply: ErrorReply = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(reply.role, UiRole::Assistant);
    assert_eq!(
        reply.content,
        "⚠️ You are being rate limited. Please wait a few seconds and try again."
    );
}

#[tokio::test]
async fn other_model_failures_become_an_unexpected_error_reply() {
    let model = ScriptedModel::new(vec![Err(ModelError::Status {
        status: 401,
        message: "No auth credentials found".to_string(),
    })]);
    let response = app(model).await.oneshot(question("hi")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let reply: ErrorReply = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(reply.content, "❌ Unexpected error: No auth credentials found");
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let model = ScriptedModel::new(vec![]);
    let router = app(model.clone()).await;

    let response = router.clone().oneshot(chat_request("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(chat_request(json!({"messages": []}).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app(ScriptedModel::new(vec![]))
        .await
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}
