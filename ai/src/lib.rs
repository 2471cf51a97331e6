mod error;
mod openai;
pub mod sse;
mod types;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

pub use error::ModelError;
pub use openai::{OpenAiCompatibleClient, chunk_stream};
pub use types::{
    ChatMessage, CompletionRequest, Function, Role, StreamChunk, Tool, ToolCallInfo, ToolType,
};

// Re-export types that consumers will need to create and use tools
pub use serde_json::{Value, json};
pub use std::collections::HashMap;

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ModelError>>;

/// A hosted chat-completion service.
#[async_trait]
pub trait ModelClient: Send + Sync + std::fmt::Debug {
    /// Sends one model step and returns its incremental output.
    ///
    /// Errors returned here happen before any output was produced.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<ChunkStream, ModelError>;
}

/// One conversation with the model: history, tools and the step currently streaming.
#[derive(Debug)]
pub struct LLM {
    client: Arc<dyn ModelClient>,
    history: Vec<ChatMessage>,
    tools: Vec<Tool>,
}

impl LLM {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        LLM {
            client,
            history: vec![],
            tools: vec![],
        }
    }

    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.push(tool);
    }

    /// Set all tools for the LLM, replacing any existing tools
    pub fn set_tools(&mut self, tools: Vec<Tool>) {
        self.tools = tools;
    }

    pub fn set_system_prompt(&mut self, prompt: impl Display) {
        self.history.push(ChatMessage::system(prompt.to_string()));
    }

    pub fn extend_history(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.history.extend(messages);
    }

    /// Opens the next model step without consuming it.
    pub async fn open_step(&self) -> Result<ChunkStream, ModelError> {
        self.client
            .stream_completion(CompletionRequest {
                messages: self.history.clone(),
                tools: self.tools.clone(),
            })
            .await
    }

    /// Drains an opened step, forwarding every chunk to `on_chunk`, and records
    /// the assistant turn in the history.
    pub async fn consume_step<F, Fut>(
        &mut self,
        mut stream: ChunkStream,
        mut on_chunk: F,
    ) -> Result<Vec<ToolCallInfo>, ModelError>
    where
        F: FnMut(StreamChunk) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut full_response = String::new();
        let mut tool_calls: Vec<ToolCallInfo> = vec![];

        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::Text(content) => {
                    full_response.push_str(&content);
                    on_chunk(StreamChunk::Text(content)).await;
                }
                StreamChunk::ToolCall(call) => {
                    tool_calls.push(call.clone());
                    on_chunk(StreamChunk::ToolCall(call)).await;
                }
            }
        }

        self.history
            .push(ChatMessage::assistant(full_response, tool_calls.clone()));

        Ok(tool_calls)
    }

    /// Opens and drains the next step.
    pub async fn next_step<F, Fut>(&mut self, on_chunk: F) -> Result<Vec<ToolCallInfo>, ModelError>
    where
        F: FnMut(StreamChunk) -> Fut,
        Fut: Future<Output = ()>,
    {
        let stream = self.open_step().await?;
        self.consume_step(stream, on_chunk).await
    }

    /// Add a tool result to the conversation history
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, result: impl Into<String>) {
        self.history
            .push(ChatMessage::tool_result(tool_call_id, result));
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Get the tools that are configured for this LLM
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }
}

/// Helper function to create a tool with the given name, description, and parameters
///
/// # Example
/// ```rust
/// use ai::{create_tool, json, HashMap, Value};
///
/// let parameters: HashMap<String, Value> = serde_json::from_value(json!({
///     "type": "object",
///     "properties": {
///         "query": {
///             "type": "string",
///             "description": "The SQL query to be ran",
///         },
///     },
///     "required": ["query"],
/// })).unwrap();
///
/// let tool = create_tool(
///     "db",
///     "Call this tool to query the database",
///     parameters,
/// );
/// assert_eq!(tool.function.name, "db");
/// ```
pub fn create_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: HashMap<String, Value>,
) -> Tool {
    Tool {
        tp: ToolType::Function,
        function: Function {
            name: name.into(),
            description: Some(description.into()),
            parameters: Some(parameters),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl ModelClient for Recorder {
        async fn stream_completion(&self, request: CompletionRequest) -> Result<ChunkStream, ModelError> {
            self.requests.lock().unwrap().push(request);
            Ok(stream::iter(vec![
                Ok(StreamChunk::Text("Checking".to_string())),
                Ok(StreamChunk::ToolCall(ToolCallInfo {
                    id: "call_1".to_string(),
                    name: "schema".to_string(),
                    arguments: "{}".to_string(),
                })),
            ])
            .boxed())
        }
    }

    #[tokio::test]
    async fn steps_carry_history_and_tools() {
        let client = Arc::new(Recorder::default());
        let mut llm = LLM::new(client.clone());
        llm.set_system_prompt("system");
        llm.add_tool(create_tool("schema", "Call this tool to get the database schema", HashMap::new()));
        llm.extend_history([ChatMessage::user("hi")]);

        let mut seen = vec![];
        let calls = llm
            .next_step(|chunk| {
                seen.push(chunk);
                async {}
            })
            .await
            .unwrap();
        llm.add_tool_result("call_1", "CREATE TABLE ...");
        llm.next_step(|_| async {}).await.unwrap();

        assert_eq!(calls.len(), 1);
        assert_eq!(seen.len(), 2);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        // system, user, assistant(tool call), tool result
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[2].content.as_deref(), Some("Checking"));
        assert_eq!(requests[1].messages[3].role, Role::Tool);
    }
}
