use serde::{Deserialize, Serialize};

/// Role of a conversation message actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other,
}

impl<'de> Deserialize<'de> for Role {
    /// Unrecognized roles map to `Other` instead of failing the whole
    /// document.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::Other,
        })
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Other => "other",
        }
    }
}

/// One `{role, content}` entry in a captured conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered message sequence captured from one session slice.
///
/// This is the canonical form of `raw_context`: whatever shape the
/// transcript or inline document arrived in, only `{role, content}`
/// records survive normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first_user(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// All message text joined with newlines, in order.
    pub fn combined_text(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&message.content);
        }
        out
    }

    /// Serialized size of the raw conversation document.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conversation {
        Conversation::new(vec![
            Message::new(Role::User, "fix the bug"),
            Message::new(Role::Assistant, "done"),
            Message::new(Role::User, "thanks"),
        ])
    }

    #[test]
    fn test_first_user_and_last_assistant() {
        let conv = sample();
        assert_eq!(conv.first_user().unwrap().content, "fix the bug");
        assert_eq!(conv.last_assistant().unwrap().content, "done");
    }

    #[test]
    fn test_combined_text_preserves_order() {
        let conv = sample();
        assert_eq!(conv.combined_text(), "fix the bug\ndone\nthanks");
    }

    #[test]
    fn test_unknown_role_deserializes_as_other() {
        let msg: Message = serde_json::from_str(r#"{"role":"meta","content":"x"}"#).unwrap();
        assert_eq!(msg.role, Role::Other);
    }

    #[test]
    fn test_size_bytes_nonzero() {
        assert!(sample().size_bytes() > 0);
    }
}
