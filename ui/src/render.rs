use std::collections::HashMap;

use chat::protocol::value_text;
use chat::tools::{DB_ERROR_PREFIX, DB_TOOL, SCHEMA_TOOL};
use chat::{Part, ToolPart, ToolState, UiEvent, UiMessage, UiRole};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};

use crate::conversation::Conversation;

pub const SCHEMA_LOADED: &str = "✅ Schema loaded";

/// Lays out `db` tool output as a table when every line has the same columns.
/// Returns `None` for empty results, error text, or values that defeat parsing.
pub fn output_table(output: &str) -> Option<Table> {
    if output.starts_with(DB_ERROR_PREFIX) {
        return None;
    }
    let mut header: Option<Vec<&str>> = None;
    let mut rows = Vec::new();

    for line in output.lines() {
        let pairs: Vec<(&str, &str)> = line
            .split(", ")
            .map(|pair| pair.split_once(": "))
            .collect::<Option<_>>()?;
        let columns: Vec<&str> = pairs.iter().map(|(column, _)| *column).collect();
        match &header {
            Some(existing) if *existing != columns => return None,
            Some(_) => {}
            None => header = Some(columns),
        }
        rows.push(pairs.into_iter().map(|(_, value)| value).collect::<Vec<_>>());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header?);
    for row in rows {
        table.add_row(row);
    }
    Some(table)
}

fn render_output(output: &str) -> String {
    match output_table(output) {
        Some(table) => table.to_string(),
        None => output.dimmed().to_string(),
    }
}

fn render_tool(tool: &ToolPart) -> String {
    match (tool.tool_name.as_str(), tool.state) {
        (SCHEMA_TOOL, ToolState::OutputAvailable) => SCHEMA_LOADED.green().to_string(),
        (DB_TOOL, _) => {
            let mut out = format!("{} {}", "Query:".bold(), tool.query().unwrap_or_default().cyan());
            match (&tool.output, &tool.error_text) {
                (Some(output), _) => out.push_str(&format!("\n{}", render_output(&value_text(output)))),
                (None, Some(error)) => out.push_str(&format!("\n{}", error.red())),
                (None, None) => {}
            }
            out
        }
        (name, ToolState::OutputError) => format!(
            "{} {}",
            format!("{name} failed:").red(),
            tool.error_text.as_deref().unwrap_or_default()
        ),
        (name, _) => format!("{} {name}", "Calling".dimmed()),
    }
}

/// Renders one stored message, header line included.
pub fn render_message(message: &UiMessage, timestamp: Option<&str>) -> String {
    let who = match message.role {
        UiRole::User => "[You]".green(),
        UiRole::Assistant => "[Assistant]".blue(),
        UiRole::System => "[System]".yellow(),
    };
    let mut out = format!("{who} {}", timestamp.unwrap_or("--:--").dimmed());

    for part in &message.parts {
        match part {
            Part::Text { text } if !text.is_empty() => {
                out.push('\n');
                out.push_str(text);
            }
            Part::Tool(tool) => {
                out.push('\n');
                out.push_str(&render_tool(tool));
            }
            Part::Text { .. } | Part::Other { .. } => {}
        }
    }
    out
}

/// A compact table of the whole conversation.
pub fn history_table(conversation: &Conversation) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Time", "Role", "Message"]);

    for message in conversation.messages() {
        let role = match message.role {
            UiRole::User => "user",
            UiRole::Assistant => "assistant",
            UiRole::System => "system",
        };
        let queries: Vec<&str> = message
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Tool(tool) => tool.query(),
                _ => None,
            })
            .collect();
        let mut summary = message.text();
        for query in queries {
            summary.push_str(&format!("\n> {query}"));
        }
        table.add_row(vec![
            conversation.timestamp(&message.id).unwrap_or("--:--").to_string(),
            role.to_string(),
            summary,
        ]);
    }
    table
}

/// Turns streamed events into terminal output as they arrive.
#[derive(Debug, Default)]
pub struct Tail {
    tool_names: HashMap<String, String>,
    in_text: bool,
}

impl Tail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for `event`, if any.
    pub fn on_event(&mut self, event: &UiEvent) -> Option<String> {
        match event {
            UiEvent::TextDelta { delta, .. } => {
                self.in_text = true;
                Some(delta.blue().to_string())
            }
            UiEvent::TextEnd { .. } => self.end_text(),
            UiEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => {
                self.tool_names.insert(tool_call_id.clone(), tool_name.clone());
                let prefix = self.end_text().unwrap_or_default();
                let line = match tool_name.as_str() {
                    DB_TOOL => {
                        let query = input.get("query").and_then(|q| q.as_str()).unwrap_or_default();
                        format!("{} {}", "Query:".bold(), query.cyan())
                    }
                    SCHEMA_TOOL => "Loading schema...".dimmed().to_string(),
                    other => format!("{} {other}", "Calling".dimmed()),
                };
                Some(format!("{prefix}{line}\n"))
            }
            UiEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => match self.tool_names.get(tool_call_id).map(String::as_str) {
                Some(SCHEMA_TOOL) => Some(format!("{SCHEMA_LOADED}\n").green().to_string()),
                _ => Some(format!("{}\n", render_output(&value_text(output)))),
            },
            UiEvent::ToolOutputError { error_text, .. } => Some(format!("{}\n", error_text.red())),
            UiEvent::Error { error_text } => {
                let prefix = self.end_text().unwrap_or_default();
                Some(format!("{prefix}{}\n", error_text.red()))
            }
            UiEvent::Finish => self.end_text(),
            UiEvent::Start { .. }
            | UiEvent::StartStep
            | UiEvent::TextStart { .. }
            | UiEvent::FinishStep => None,
        }
    }

    fn end_text(&mut self) -> Option<String> {
        if std::mem::take(&mut self.in_text) {
            Some("\n".to_string())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn tail_prints_query_output_and_answer() {
        plain();
        let mut tail = Tail::new();
        let events = [
            UiEvent::Start { message_id: "a1".to_string() },
            UiEvent::StartStep,
            UiEvent::ToolInputAvailable {
                tool_call_id: "c1".to_string(),
                tool_name: "db".to_string(),
                input: json!({"query": "SELECT COUNT(*) AS n FROM products"}),
            },
            UiEvent::ToolOutputAvailable {
                tool_call_id: "c1".to_string(),
                output: json!("No results found."),
            },
            UiEvent::FinishStep,
            UiEvent::StartStep,
            UiEvent::TextStart { id: "t".to_string() },
            UiEvent::TextDelta { id: "t".to_string(), delta: "There are 6.".to_string() },
            UiEvent::TextEnd { id: "t".to_string() },
            UiEvent::FinishStep,
            UiEvent::Finish,
        ];
        let printed: String = events.iter().filter_map(|e| tail.on_event(e)).collect();

        assert_eq!(
            printed,
            "Query: SELECT COUNT(*) AS n FROM products\nNo results found.\nThere are 6.\n"
        );
    }

    #[test]
    fn uniform_rows_become_a_table() {
        plain();
        let table = output_table("name: Laptop, price: 999.99\nname: Mouse, price: 19.5")
            .unwrap()
            .to_string();
        assert!(table.contains("name"));
        assert!(table.contains("Laptop"));
        assert!(table.contains("19.5"));
        assert!(!table.contains("name: Laptop"));
    }

    #[test]
    fn irregular_output_stays_text() {
        assert!(output_table("No results found.").is_none());
        assert!(output_table("❌ Database Error: no such table: customers").is_none());
        assert!(output_table("a: 1\nb: 2").is_none());
        assert!(output_table("").is_none());
    }

    #[test]
    fn schema_calls_show_loaded_marker() {
        plain();
        let mut tail = Tail::new();
        tail.on_event(&UiEvent::ToolInputAvailable {
            tool_call_id: "c1".to_string(),
            tool_name: "schema".to_string(),
            input: json!({}),
        });
        let out = tail.on_event(&UiEvent::ToolOutputAvailable {
            tool_call_id: "c1".to_string(),
            output: json!("CREATE TABLE products (...)"),
        });
        assert_eq!(out.as_deref(), Some("✅ Schema loaded\n"));
    }

    #[test]
    fn stored_messages_render_tool_parts() {
        plain();
        let mut message = UiMessage::assistant("a1");
        message.apply_event(&UiEvent::ToolInputAvailable {
            tool_call_id: "c1".to_string(),
            tool_name: "db".to_string(),
            input: json!({"query": "SELECT 1 AS one"}),
        });
        message.apply_event(&UiEvent::ToolOutputAvailable {
            tool_call_id: "c1".to_string(),
            output: json!("one: 1"),
        });
        message.apply_event(&UiEvent::TextDelta { id: "t".to_string(), delta: "One.".to_string() });

        let rendered = render_message(&message, Some("09:15"));
        assert!(rendered.starts_with("[Assistant] 09:15\nQuery: SELECT 1 AS one\n"));
        assert!(rendered.contains("│ one │"));
        assert!(rendered.ends_with("\nOne."));
    }

    #[test]
    fn history_lists_every_message() {
        plain();
        let mut conversation = Conversation::new();
        conversation.push_user("How many products?");
        conversation.observe(|| "12:00".to_string());
        let table = history_table(&conversation).to_string();
        assert!(table.contains("How many products?"));
        assert!(table.contains("12:00"));
    }
}
