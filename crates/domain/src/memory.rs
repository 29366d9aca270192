use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, Role};

/// Ordered conversation memory for one agent role.
///
/// The effective projection handed to the LLM is the latest system
/// message (if any) followed by every non-system message in original
/// order, so a replaced system prompt takes effect without rewriting
/// history.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Memory {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Memory {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn latest_system_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::System)
    }

    /// Latest system message (if any) followed by all non-system
    /// messages in order.
    pub fn messages_with_latest_system(&self) -> Vec<ChatMessage> {
        let mut view = Vec::with_capacity(self.messages.len());
        if let Some(system) = self.latest_system_message() {
            view.push(system.clone());
        }
        view.extend(
            self.messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        view
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_projection_uses_latest_system() {
        let mut memory = Memory::default();
        memory.add_message(ChatMessage::system("v1"));
        memory.add_message(ChatMessage::user("hello"));
        memory.add_message(ChatMessage::system("v2"));
        memory.add_message(ChatMessage::assistant("hi"));

        let view = memory.messages_with_latest_system();
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].text(), "v2");
        assert_eq!(view[1].text(), "hello");
        assert_eq!(view[2].text(), "hi");
    }

    #[test]
    fn projection_without_system_is_passthrough() {
        let mut memory = Memory::default();
        memory.add_message(ChatMessage::user("a"));
        memory.add_message(ChatMessage::assistant("b"));
        let view = memory.messages_with_latest_system();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].text(), "a");
    }

    #[test]
    fn empty_memory() {
        let memory = Memory::default();
        assert!(memory.is_empty());
        assert!(memory.last_message().is_none());
        assert!(memory.messages_with_latest_system().is_empty());
    }
}
