//! Tools the model may call during a chat request.

use std::sync::Arc;

use ai::{HashMap, Tool, Value, create_tool, json};
use async_trait::async_trait;
use db::{Database, DatabaseResult, SCHEMA_DDL};
use thiserror::Error;
use tracing::{debug, warn};

pub const DB_TOOL: &str = "db";
pub const SCHEMA_TOOL: &str = "schema";

pub const NO_RESULTS: &str = "No results found.";
pub const DB_ERROR_PREFIX: &str = "❌ Database Error: ";

/// The call could not be executed at all. Database failures are not reported
/// this way; they become a normal tool output the model can read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    Unknown(String),

    #[error("invalid input for tool `{tool}`: {reason}")]
    InvalidInput { tool: String, reason: String },
}

#[async_trait]
pub trait ToolExecutor: Send + Sync + std::fmt::Debug {
    async fn execute(&self, input: &Value) -> Result<String, ToolError>;
}

#[derive(Debug, Clone)]
struct RegisteredTool {
    tool: Tool,
    executor: Arc<dyn ToolExecutor>,
}

/// Tool definitions offered to the model together with their executors.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    registered: Vec<RegisteredTool>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The `db` and `schema` tools over `database`.
    #[must_use]
    pub fn sql_tools(database: Arc<dyn Database>) -> Self {
        let mut registry = Self::new();
        registry.register(db_tool(), DbTool::new(database));
        registry.register(schema_tool(), SchemaTool);
        registry
    }

    pub fn register(&mut self, tool: Tool, executor: impl ToolExecutor + 'static) {
        self.registered.retain(|r| r.tool.function.name != tool.function.name);
        self.registered.push(RegisteredTool {
            tool,
            executor: Arc::new(executor),
        });
    }

    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.registered.iter().map(|r| r.tool.clone()).collect()
    }

    pub async fn call(&self, name: &str, input: &Value) -> Result<String, ToolError> {
        let registered = self
            .registered
            .iter()
            .find(|r| r.tool.function.name == name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;

        debug!(tool = name, %input, "executing tool");
        registered.executor.execute(input).await
    }
}

fn parameters(schema: Value) -> HashMap<String, Value> {
    match schema {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

#[must_use]
pub fn db_tool() -> Tool {
    create_tool(
        DB_TOOL,
        "Call this tool to query the database",
        parameters(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to be ran",
                },
            },
            "required": ["query"],
        })),
    )
}

#[must_use]
pub fn schema_tool() -> Tool {
    create_tool(
        SCHEMA_TOOL,
        "Call this tool to get the database schema",
        parameters(json!({
            "type": "object",
            "properties": {},
        })),
    )
}

/// Runs the model's SQL and renders rows as text.
#[derive(Debug)]
pub struct DbTool {
    database: Arc<dyn Database>,
}

impl DbTool {
    #[must_use]
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl ToolExecutor for DbTool {
    async fn execute(&self, input: &Value) -> Result<String, ToolError> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidInput {
                tool: DB_TOOL.to_string(),
                reason: "`query` must be a non-empty string".to_string(),
            })?;

        match self.database.get_results(query).await {
            Ok(result) => Ok(format_rows(&result)),
            Err(err) => {
                warn!(%query, error = %err, "query failed");
                Ok(format_db_error(&err.to_string()))
            }
        }
    }
}

#[derive(Debug)]
pub struct SchemaTool;

#[async_trait]
impl ToolExecutor for SchemaTool {
    async fn execute(&self, _input: &Value) -> Result<String, ToolError> {
        Ok(SCHEMA_DDL.to_string())
    }
}

/// One line per row, each `column: value` pair separated by `, `.
#[must_use]
pub fn format_rows(result: &DatabaseResult) -> String {
    if result.is_empty() {
        return NO_RESULTS.to_string();
    }

    result
        .records()
        .map(|record| {
            record
                .into_iter()
                .map(|(column, value)| format!("{column}: {}", display_value(value)))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn format_db_error(message: &str) -> String {
    let message = message.trim();
    let message = if message.is_empty() {
        "Unknown error occurred."
    } else {
        message
    };
    format!("{DB_ERROR_PREFIX}{message}")
}

/// Keeps each row on one line: embedded line breaks are escaped.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.replace('\r', "\\r").replace('\n', "\\n"),
        other => other.to_string(),
    }
}
