//! OpenAI-compatible chat-completions client (OpenRouter, OpenAI, local gateways).

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::sse::SseDecoder;
use crate::{
    ChatMessage, ChunkStream, CompletionRequest, ModelClient, ModelError, Role, StreamChunk,
    Tool, ToolCallInfo,
};

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    model: String,
    http: Client,
}

impl fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http,
        })
    }

    pub fn from_config(conf: &config::AIConfig, api_key: impl Into<String>) -> Result<Self, ModelError> {
        Self::new(conf.url.clone(), api_key, conf.model.clone())
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<&'a Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    tp: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

impl<'a> WireRequest<'a> {
    fn new(model: &'a str, request: &'a CompletionRequest) -> Self {
        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request.tools.iter().collect(),
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            stream: true,
        }
    }
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    tp: "function",
                    function: WireFunctionCall {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

/// Streaming chunk (server-sent events)
#[derive(Deserialize, Debug)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ErrorDetail>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize, Debug)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize, Debug)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// OpenAI-style error response
#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ErrorDetail {
    message: String,
    /// Providers disagree on whether this is a number or a string.
    code: Option<Value>,
}

impl ErrorDetail {
    fn status(&self) -> Option<u16> {
        match &self.code {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<ChunkStream, ModelError> {
        let body = WireRequest::new(&self.model, &request);
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, messages = request.messages.len(), "requesting completion");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => body.error.message,
                Err(_) if text.trim().is_empty() => status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
                Err(_) => text,
            };
            return Err(ModelError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(chunk_stream(response.bytes_stream()))
    }
}

#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

struct ChunkState {
    body: BoxStream<'static, Result<Bytes, ModelError>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk, ModelError>>,
    calls: BTreeMap<usize, PartialToolCall>,
    finished: bool,
}

impl ChunkState {
    fn handle_data(&mut self, data: &str) {
        if self.finished {
            return;
        }
        if data == "[DONE]" {
            self.finish();
            return;
        }

        let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                self.fail(ModelError::Decode(format!("{err}: {data}")));
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.fail(ModelError::Status {
                status: error.status().unwrap_or(502),
                message: error.message,
            });
            return;
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content
                && !content.is_empty()
            {
                self.pending.push_back(Ok(StreamChunk::Text(content)));
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let call = self.calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    call.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }

            if choice.finish_reason.is_some() {
                self.flush_tool_calls();
            }
        }
    }

    fn flush_tool_calls(&mut self) {
        for (index, call) in std::mem::take(&mut self.calls) {
            let arguments = if call.arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                call.arguments
            };
            self.pending.push_back(Ok(StreamChunk::ToolCall(ToolCallInfo {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.name,
                arguments,
            })));
        }
    }

    fn finish(&mut self) {
        if let Some(data) = self.decoder.finish() {
            self.handle_data(&data);
        }
        self.flush_tool_calls();
        self.finished = true;
    }

    fn fail(&mut self, err: ModelError) {
        self.pending.push_back(Err(err));
        self.calls.clear();
        self.finished = true;
    }
}

/// Turns an SSE response body into text and assembled tool-call chunks.
///
/// Tool call fragments are buffered per index and emitted once the choice
/// reports a finish reason or the stream ends.
pub fn chunk_stream<S, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display,
{
    let state = ChunkState {
        body: body
            .map(|item| item.map_err(|err| ModelError::Transport(err.to_string())))
            .boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        calls: BTreeMap::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for data in state.decoder.push(&bytes) {
                        state.handle_data(&data);
                    }
                }
                Some(Err(err)) => state.fail(err),
                None => state.finish(),
            }
        }
    })
    .boxed()
}
