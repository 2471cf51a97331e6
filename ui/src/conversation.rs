use std::collections::HashMap;

use chat::{ErrorReply, Part, UiEvent, UiMessage, UiRole};
use uuid::Uuid;

/// The messages of one chat session and the time each was first seen.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<UiMessage>,
    timestamps: HashMap<String, String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[UiMessage] {
        &self.messages
    }

    pub fn timestamp(&self, id: &str) -> Option<&str> {
        self.timestamps.get(id).map(String::as_str)
    }

    /// Stamps every message that has no timestamp yet. Existing stamps never change.
    pub fn observe(&mut self, clock: impl Fn() -> String) {
        for message in &self.messages {
            if !self.timestamps.contains_key(&message.id) {
                self.timestamps.insert(message.id.clone(), clock());
            }
        }
    }

    pub fn push_user(&mut self, text: &str) -> &UiMessage {
        let message = UiMessage::user(Uuid::new_v4().to_string(), text);
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Folds a streamed event into the assistant message it belongs to,
    /// creating that message on `start`.
    pub fn apply(&mut self, event: &UiEvent) {
        if let UiEvent::Start { message_id } = event {
            self.messages.push(UiMessage::assistant(message_id.clone()));
            return;
        }
        if let Some(message) = self.messages.last_mut().filter(|m| m.role == UiRole::Assistant) {
            message.apply_event(event);
        }
    }

    /// Records a reply that came back as plain JSON instead of a stream.
    pub fn push_reply(&mut self, reply: ErrorReply) {
        self.messages.push(UiMessage {
            id: Uuid::new_v4().to_string(),
            role: reply.role,
            parts: vec![Part::Text {
                text: reply.content,
            }],
        });
    }
}
