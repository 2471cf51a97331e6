use ai::{ChatMessage, CompletionRequest, ModelClient, ModelError, OpenAiCompatibleClient, StreamChunk};
use futures::StreamExt;
use httpmock::prelude::*;
use serde_json::json;

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::user("How many products are in category Electronics?")],
        tools: vec![],
    }
}

#[tokio::test]
async fn streams_text_from_chat_completions() {
    let server = MockServer::start();
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Three\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" products.\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n"
    );

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/chat/completions")
            .header("authorization", "Bearer test-key")
            .json_body(json!({
                "model": "openai/gpt-oss-120b:free",
                "stream": true,
                "messages": [
                    {"role": "user", "content": "How many products are in category Electronics?"}
                ]
            }));
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let client = OpenAiCompatibleClient::new(
        server.url("/api/v1/"),
        "test-key",
        "openai/gpt-oss-120b:free",
    )
    .unwrap();

    let chunks: Vec<_> = client
        .stream_completion(request())
        .await
        .expect("stream opens")
        .collect()
        .await;

    assert_eq!(
        chunks,
        vec![
            Ok(StreamChunk::Text("Three".to_string())),
            Ok(StreamChunk::Text(" products.".to_string())),
        ]
    );
    mock.assert();
}

#[tokio::test]
async fn rate_limit_status_is_reported_before_streaming() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(429)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {"message": "Rate limit exceeded: free-models-per-min", "code": 429}
            }));
    });

    let client = OpenAiCompatibleClient::new(server.base_url(), "test-key", "m").unwrap();
    let Err(err) = client.stream_completion(request()).await else {
        panic!("expected an error");
    };

    assert_eq!(
        err,
        ModelError::Status {
            status: 429,
            message: "Rate limit exceeded: free-models-per-min".to_string(),
        }
    );
    assert!(err.is_rate_limit());
}

#[tokio::test]
async fn invalid_key_keeps_provider_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401).body("No auth credentials found");
    });

    let client = OpenAiCompatibleClient::new(server.base_url(), "bad", "m").unwrap();
    let Err(err) = client.stream_completion(request()).await else {
        panic!("expected an error");
    };

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.message(), "No auth credentials found");
    assert!(!err.is_rate_limit());
}
