use crate::core::message::{Message, MessagePatch, Role};

/// The transcript a beam scatters from and gathers back into.
///
/// The system prompt occupies a single slot at the head of the transcript;
/// setting it again replaces the previous one rather than stacking prompts.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.set_system_prompt(prompt);
        conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace (or insert) the system message at the head of the transcript.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let message = Message::system(prompt);
        if let Some(index) = self.messages.iter().position(|m| m.role == Role::System) {
            let existing = self.messages.remove(index);
            self.messages.insert(0, existing.merged(MessagePatch {
                content: Some(message.content),
                ..Default::default()
            }));
        } else {
            self.messages.insert(0, message);
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Write a gathered beam result back into the transcript. The message
    /// keeps its origin model label but is never still "typing" once accepted.
    pub fn accept(&mut self, message: Message) {
        self.messages.push(message.merged(MessagePatch {
            typing: Some(false),
            ..Default::default()
        }));
    }

    /// Immutable snapshot for [`BeamStore::open`](crate::core::beam::BeamStore::open).
    pub fn history_snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// True when the transcript ends with a user message, i.e. it is a valid
    /// scatter prefix.
    pub fn awaiting_reply(&self) -> bool {
        self.messages.last().is_some_and(Message::is_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_conversation_is_not_awaiting_reply() {
        let conversation = Conversation::new();
        assert!(conversation.is_empty());
        assert!(!conversation.awaiting_reply());
    }

    #[test]
    fn user_message_makes_a_valid_scatter_prefix() {
        let mut conversation = Conversation::new();
        conversation.push_user("hello");
        assert!(conversation.awaiting_reply());

        conversation.push_assistant("hi");
        assert!(!conversation.awaiting_reply());
    }

    #[test]
    fn system_prompt_occupies_a_single_head_slot() {
        let mut conversation = Conversation::new();
        conversation.push_user("question");
        conversation.set_system_prompt("be terse");
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages()[0].content, "be terse");

        conversation.set_system_prompt("be verbose");
        let system_count = conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(conversation.messages()[0].content, "be verbose");
        assert_eq!(conversation.messages().len(), 2);
    }

    #[test]
    fn accept_clears_typing_and_keeps_origin() {
        let mut conversation = Conversation::new();
        conversation.push_user("q");

        let mut gathered = Message::assistant("the chosen answer");
        gathered.typing = true;
        gathered.origin_model = Some("gpt-4o".to_string());
        conversation.accept(gathered);

        let accepted = conversation.messages().last().unwrap();
        assert!(!accepted.typing);
        assert_eq!(accepted.origin_model.as_deref(), Some("gpt-4o"));
        assert!(!conversation.awaiting_reply());
    }

    #[test]
    fn history_snapshot_is_independent_of_later_edits() {
        let mut conversation = Conversation::new();
        conversation.push_user("first");
        let snapshot = conversation.history_snapshot();

        conversation.push_assistant("later");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(conversation.messages().len(), 2);
    }
}
