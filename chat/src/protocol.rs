//! Messages exchanged between the chat endpoint and its clients.
//!
//! Requests carry the whole conversation as [`UiMessage`]s. Responses are a
//! server-sent event stream where every `data:` line holds one [`UiEvent`]
//! as JSON, terminated by a literal `[DONE]` line.

use ai::{ChatMessage, ToolCallInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header identifying the event framing of a streamed response.
pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
pub const STREAM_DONE: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<UiMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub role: UiRole,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPart", into = "RawPart")]
pub enum Part {
    Text { text: String },
    Tool(ToolPart),
    /// Parts this server does not interpret, such as `step-start`.
    Other { kind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

impl ToolState {
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, ToolState::OutputAvailable | ToolState::OutputError)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolPart {
    pub tool_name: String,
    pub tool_call_id: String,
    pub state: ToolState,
    pub input: Value,
    pub output: Option<Value>,
    pub error_text: Option<String>,
}

impl ToolPart {
    #[must_use]
    pub fn issued(tool_call_id: String, tool_name: String, input: Value) -> Self {
        Self {
            tool_name,
            tool_call_id,
            state: ToolState::InputAvailable,
            input,
            output: None,
            error_text: None,
        }
    }

    /// Records the tool's output. A part resolves once; later calls are ignored.
    pub fn resolve(&mut self, output: Value) -> bool {
        if self.state.is_resolved() {
            return false;
        }
        self.state = ToolState::OutputAvailable;
        self.output = Some(output);
        true
    }

    pub fn fail(&mut self, error_text: String) -> bool {
        if self.state.is_resolved() {
            return false;
        }
        self.state = ToolState::OutputError;
        self.error_text = Some(error_text);
        true
    }

    /// The `query` argument of a `db` call, when present.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.input.get("query").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<ToolState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
}

const TOOL_PART_PREFIX: &str = "tool-";

impl TryFrom<RawPart> for Part {
    type Error = String;

    fn try_from(raw: RawPart) -> Result<Self, Self::Error> {
        if raw.kind == "text" {
            return Ok(Part::Text {
                text: raw.text.unwrap_or_default(),
            });
        }

        let Some(tool_name) = raw.kind.strip_prefix(TOOL_PART_PREFIX) else {
            return Ok(Part::Other { kind: raw.kind });
        };
        let tool_call_id = raw
            .tool_call_id
            .ok_or_else(|| format!("part {} is missing toolCallId", raw.kind))?;

        Ok(Part::Tool(ToolPart {
            tool_name: tool_name.to_string(),
            tool_call_id,
            state: raw.state.unwrap_or(ToolState::InputAvailable),
            input: raw.input.unwrap_or(Value::Null),
            output: raw.output,
            error_text: raw.error_text,
        }))
    }
}

impl From<Part> for RawPart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text { text } => RawPart {
                kind: "text".to_string(),
                text: Some(text),
                ..RawPart::default()
            },
            Part::Tool(tool) => RawPart {
                kind: format!("{TOOL_PART_PREFIX}{}", tool.tool_name),
                tool_call_id: Some(tool.tool_call_id),
                state: Some(tool.state),
                input: Some(tool.input),
                output: tool.output,
                error_text: tool.error_text,
                ..RawPart::default()
            },
            Part::Other { kind } => RawPart {
                kind,
                ..RawPart::default()
            },
        }
    }
}

/// One streamed event of an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiEvent {
    Start {
        message_id: String,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    FinishStep,
    Error {
        error_text: String,
    },
    Finish,
}

/// Body returned instead of a stream when the request fails before streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub role: UiRole,
    pub content: String,
}

impl UiMessage {
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: UiRole::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: UiRole::Assistant,
            parts: vec![],
        }
    }

    /// All text parts joined in order.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_part_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolPart> {
        self.parts.iter_mut().find_map(|part| match part {
            Part::Tool(tool) if tool.tool_call_id == tool_call_id => Some(tool),
            _ => None,
        })
    }

    /// Folds a streamed event into this (assistant) message.
    pub fn apply_event(&mut self, event: &UiEvent) {
        match event {
            UiEvent::StartStep => self.parts.push(Part::Other {
                kind: "step-start".to_string(),
            }),
            UiEvent::TextStart { .. } => self.parts.push(Part::Text {
                text: String::new(),
            }),
            UiEvent::TextDelta { delta, .. } => match self.parts.last_mut() {
                Some(Part::Text { text }) => text.push_str(delta),
                _ => self.parts.push(Part::Text {
                    text: delta.clone(),
                }),
            },
            UiEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => {
                if self.tool_part_mut(tool_call_id).is_none() {
                    self.parts.push(Part::Tool(ToolPart::issued(
                        tool_call_id.clone(),
                        tool_name.clone(),
                        input.clone(),
                    )));
                }
            }
            UiEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => {
                if let Some(tool) = self.tool_part_mut(tool_call_id) {
                    tool.resolve(output.clone());
                }
            }
            UiEvent::ToolOutputError {
                tool_call_id,
                error_text,
            } => {
                if let Some(tool) = self.tool_part_mut(tool_call_id) {
                    tool.fail(error_text.clone());
                }
            }
            UiEvent::Error { error_text } => self.parts.push(Part::Text {
                text: error_text.clone(),
            }),
            UiEvent::Start { .. } | UiEvent::TextEnd { .. } | UiEvent::FinishStep | UiEvent::Finish => {}
        }
    }
}

/// Converts UI messages into the flattened history the model client expects.
///
/// Resolved tool parts become an assistant turn carrying the tool calls followed
/// by one tool-result message per call. Unresolved tool parts are dropped.
#[must_use]
pub fn to_model_messages(messages: &[UiMessage]) -> Vec<ChatMessage> {
    let mut converted = Vec::new();

    for message in messages {
        match message.role {
            UiRole::System => {
                let text = message.text();
                if !text.is_empty() {
                    converted.push(ChatMessage::system(text));
                }
            }
            UiRole::User => {
                let text = message.text();
                if !text.is_empty() {
                    converted.push(ChatMessage::user(text));
                }
            }
            UiRole::Assistant => convert_assistant(message, &mut converted),
        }
    }

    converted
}

#[derive(Default)]
struct AssistantBlock {
    text: String,
    calls: Vec<ToolCallInfo>,
    results: Vec<ChatMessage>,
}

impl AssistantBlock {
    fn flush(&mut self, out: &mut Vec<ChatMessage>) {
        let block = std::mem::take(self);
        if block.text.is_empty() && block.calls.is_empty() {
            return;
        }
        out.push(ChatMessage::assistant(block.text, block.calls));
        out.extend(block.results);
    }
}

fn convert_assistant(message: &UiMessage, out: &mut Vec<ChatMessage>) {
    let mut block = AssistantBlock::default();

    for part in &message.parts {
        match part {
            Part::Text { text } => {
                if !block.calls.is_empty() {
                    block.flush(out);
                }
                block.text.push_str(text);
            }
            Part::Tool(tool) if tool.state.is_resolved() => {
                let arguments = match &tool.input {
                    Value::Null => "{}".to_string(),
                    input => input.to_string(),
                };
                let result = match (&tool.output, &tool.error_text) {
                    (Some(output), _) => value_text(output),
                    (None, Some(error_text)) => error_text.clone(),
                    (None, None) => String::new(),
                };
                block.calls.push(ToolCallInfo {
                    id: tool.tool_call_id.clone(),
                    name: tool.tool_name.clone(),
                    arguments,
                });
                block
                    .results
                    .push(ChatMessage::tool_result(tool.tool_call_id.clone(), result));
            }
            Part::Other { kind } if kind == "step-start" && !block.calls.is_empty() => {
                block.flush(out);
            }
            Part::Tool(_) | Part::Other { .. } => {}
        }
    }

    block.flush(out);
}

/// Strings are used verbatim, anything else as compact JSON.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
