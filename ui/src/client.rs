use ai::sse::SseDecoder;
use anyhow::{Context, bail};
use chat::protocol::STREAM_DONE;
use chat::{ChatRequestBody, ErrorReply, UiEvent, UiMessage};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;

/// How the server answered a chat request.
#[derive(Debug)]
pub enum Outcome {
    /// Events were streamed to the callback.
    Streamed,
    /// The request failed before streaming and the server sent a ready-made reply.
    Reply(ErrorReply),
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
}

impl ChatClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Posts the conversation and forwards every streamed event to `on_event`.
    pub async fn send(
        &self,
        messages: &[UiMessage],
        mut on_event: impl FnMut(UiEvent),
    ) -> anyhow::Result<Outcome> {
        let response = self
            .http
            .post(&self.url)
            .json(&ChatRequestBody {
                messages: messages.to_vec(),
            })
            .send()
            .await
            .with_context(|| format!("could not reach {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat server returned {status}: {text}");
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let reply = response.json().await.context("malformed reply")?;
            return Ok(Outcome::Reply(reply));
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("stream interrupted")?;
            for payload in decoder.push(&chunk) {
                if payload == STREAM_DONE {
                    return Ok(Outcome::Streamed);
                }
                let event = serde_json::from_str(&payload)
                    .with_context(|| format!("malformed event: {payload}"))?;
                on_event(event);
            }
        }
        Ok(Outcome::Streamed)
    }
}
