//! The model/tool step loop behind one chat request.

use std::sync::Arc;

use ai::{ChunkStream, LLM, ModelClient, ModelError, StreamChunk, ToolCallInfo, Value};
use futures::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::prompt::system_prompt;
use crate::protocol::{UiEvent, UiMessage, to_model_messages};
use crate::tools::{ToolError, ToolRegistry};

/// The client stopped reading the event stream.
#[derive(Debug)]
struct Disconnected;

async fn send(events: &mpsc::Sender<UiEvent>, event: UiEvent) -> Result<(), Disconnected> {
    events.send(event).await.map_err(|_| Disconnected)
}

/// Model failures after the stream started, worded like the pre-stream reply.
fn error_event(err: ModelError) -> UiEvent {
    UiEvent::Error {
        error_text: ChatError::Model(err).assistant_reply(),
    }
}

/// A chat request that has not talked to the model yet.
#[derive(Debug)]
pub struct ChatAgent {
    llm: LLM,
    registry: ToolRegistry,
    max_steps: usize,
    message_id: String,
}

impl ChatAgent {
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: ToolRegistry,
        max_steps: usize,
        messages: &[UiMessage],
    ) -> Self {
        let mut llm = LLM::new(client);
        llm.set_system_prompt(system_prompt());
        llm.set_tools(registry.tools());
        llm.extend_history(to_model_messages(messages));

        Self {
            llm,
            registry,
            max_steps: max_steps.max(1),
            message_id: format!("msg-{}", Uuid::new_v4().simple()),
        }
    }

    /// Opens the first model step and waits for its first chunk. Failures
    /// up to that point are reported as a plain assistant reply instead of
    /// a stream.
    pub async fn start(self) -> Result<ChatRun, ModelError> {
        let mut opened = self.llm.open_step().await?;
        let first = match opened.next().await {
            Some(Err(err)) => return Err(err),
            Some(Ok(chunk)) => stream::once(async move { Ok(chunk) }).chain(opened).boxed(),
            None => stream::empty().boxed(),
        };
        Ok(ChatRun {
            agent: self,
            first: Some(first),
        })
    }
}

/// A chat request whose first step is open and ready to stream.
pub struct ChatRun {
    agent: ChatAgent,
    first: Option<ChunkStream>,
}

impl std::fmt::Debug for ChatRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRun")
            .field("agent", &self.agent)
            .field("first_pending", &self.first.is_some())
            .finish()
    }
}

impl ChatRun {
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.agent.message_id
    }

    /// Streams the whole request into `events`, stopping at `deadline`.
    ///
    /// Always ends with a `finish` event unless the receiver went away.
    pub async fn drive(mut self, events: mpsc::Sender<UiEvent>, deadline: Instant) {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let outcome = tokio::time::timeout_at(deadline, self.run(&events)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(Disconnected)) => debug!("client went away, chat run stopped"),
            Err(_) => {
                warn!(message_id = %self.agent.message_id, "chat run timed out");
                let error_text = ChatError::Timeout(timeout).to_string();
                if send(&events, UiEvent::Error { error_text }).await.is_ok() {
                    let _ = send(&events, UiEvent::Finish).await;
                }
            }
        }
    }

    async fn run(&mut self, events: &mpsc::Sender<UiEvent>) -> Result<(), Disconnected> {
        send(
            events,
            UiEvent::Start {
                message_id: self.agent.message_id.clone(),
            },
        )
        .await?;

        let mut step = 0;
        loop {
            step += 1;
            let opened = match self.first.take() {
                Some(stream) => Ok(stream),
                None => tokio::select! {
                    opened = self.agent.llm.open_step() => opened,
                    () = events.closed() => return Err(Disconnected),
                },
            };
            let stream = match opened {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(step, error = %err, "model step failed to open");
                    send(events, error_event(err)).await?;
                    break;
                }
            };

            send(events, UiEvent::StartStep).await?;
            let calls = match self.stream_text(step, stream, events).await? {
                Ok(calls) => calls,
                Err(err) => {
                    warn!(step, error = %err, "model step failed mid-stream");
                    send(events, error_event(err)).await?;
                    break;
                }
            };

            if calls.is_empty() {
                send(events, UiEvent::FinishStep).await?;
                break;
            }

            for call in calls {
                self.run_tool(call, events).await?;
            }
            send(events, UiEvent::FinishStep).await?;

            if step >= self.agent.max_steps {
                info!(step, "step limit reached, ending chat run");
                break;
            }
        }

        send(events, UiEvent::Finish).await
    }

    /// Forwards text deltas of one step and returns the tool calls it requested.
    async fn stream_text(
        &mut self,
        step: usize,
        stream: ChunkStream,
        events: &mpsc::Sender<UiEvent>,
    ) -> Result<Result<Vec<ToolCallInfo>, ModelError>, Disconnected> {
        let text_id = format!("{}-text-{step}", self.agent.message_id);
        let mut text_open = false;

        let sender = events.clone();
        let consumed = self.agent.llm.consume_step(stream, |chunk| {
            let mut batch = Vec::new();
            if let StreamChunk::Text(delta) = chunk {
                if !text_open {
                    text_open = true;
                    batch.push(UiEvent::TextStart { id: text_id.clone() });
                }
                batch.push(UiEvent::TextDelta {
                    id: text_id.clone(),
                    delta,
                });
            }
            let sender = sender.clone();
            async move {
                for event in batch {
                    if sender.send(event).await.is_err() {
                        break;
                    }
                }
            }
        });

        // Dropping the step drops the model response body with it.
        let result = tokio::select! {
            result = consumed => result,
            () = events.closed() => return Err(Disconnected),
        };
        if events.is_closed() {
            return Err(Disconnected);
        }
        if text_open {
            send(events, UiEvent::TextEnd { id: text_id }).await?;
        }
        Ok(result)
    }

    async fn run_tool(
        &mut self,
        call: ToolCallInfo,
        events: &mpsc::Sender<UiEvent>,
    ) -> Result<(), Disconnected> {
        let parsed: Result<Value, _> = serde_json::from_str(&call.arguments);
        let input = match &parsed {
            Ok(input) => input.clone(),
            Err(_) => Value::String(call.arguments.clone()),
        };

        send(
            events,
            UiEvent::ToolInputAvailable {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                input,
            },
        )
        .await?;

        let outcome = match parsed {
            Ok(input) => self.agent.registry.call(&call.name, &input).await,
            Err(err) => Err(ToolError::InvalidInput {
                tool: call.name.clone(),
                reason: err.to_string(),
            }),
        };

        match outcome {
            Ok(output) => {
                send(
                    events,
                    UiEvent::ToolOutputAvailable {
                        tool_call_id: call.id.clone(),
                        output: Value::String(output.clone()),
                    },
                )
                .await?;
                self.agent.llm.add_tool_result(call.id, output);
            }
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call rejected");
                let error_text = err.to_string();
                send(
                    events,
                    UiEvent::ToolOutputError {
                        tool_call_id: call.id.clone(),
                        error_text: error_text.clone(),
                    },
                )
                .await?;
                self.agent.llm.add_tool_result(call.id, error_text);
            }
        }
        Ok(())
    }
}
