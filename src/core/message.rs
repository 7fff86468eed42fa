use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// A single conversation message. `typing` is true while the content is still
/// being streamed in; `updated` never moves backwards while streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub typing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_model: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Partial update to a [`Message`]. Fields left as `None` keep the current
/// value; merging is a pure function so streaming callbacks stay testable.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub typing: Option<bool>,
    pub origin_model: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            role,
            content: content.into(),
            typing: false,
            origin_model: None,
            created: now,
            updated: now,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    /// Merge a partial update into this message, refreshing `updated`.
    /// The timestamp is clamped so it never decreases, even if the wall clock
    /// steps backwards between two chunks.
    pub fn merged(&self, patch: MessagePatch) -> Message {
        Message {
            role: self.role,
            content: patch.content.unwrap_or_else(|| self.content.clone()),
            typing: patch.typing.unwrap_or(self.typing),
            origin_model: patch.origin_model.or_else(|| self.origin_model.clone()),
            created: self.created,
            updated: Utc::now().max(self.updated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_round_trip() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::try_from(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("tool").is_err());
        assert!(Role::try_from("").is_err());
    }

    #[test]
    fn merged_replaces_only_patched_fields() {
        let message = Message::assistant("partial");
        let next = message.merged(MessagePatch {
            content: Some("partial text".to_string()),
            typing: Some(true),
            ..Default::default()
        });

        assert_eq!(next.content, "partial text");
        assert!(next.typing);
        assert_eq!(next.role, Role::Assistant);
        assert_eq!(next.created, message.created);
    }

    #[test]
    fn merged_timestamp_is_monotonic() {
        let mut message = Message::assistant("");
        // Force a future timestamp; a merge must not move it backwards.
        message.updated += chrono::Duration::hours(1);
        let future = message.updated;

        let next = message.merged(MessagePatch {
            content: Some("chunk".to_string()),
            ..Default::default()
        });
        assert!(next.updated >= future);
    }

    #[test]
    fn merged_keeps_origin_model_when_unpatched() {
        let mut message = Message::assistant("hi");
        message.origin_model = Some("gpt-4o".to_string());

        let next = message.merged(MessagePatch {
            typing: Some(false),
            ..Default::default()
        });
        assert_eq!(next.origin_model.as_deref(), Some("gpt-4o"));
    }
}
