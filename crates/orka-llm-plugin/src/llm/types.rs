//! Common request and result shapes shared by every provider backend.

use serde::{Deserialize, Serialize};

/// A chat completion request.
///
/// Numeric optionals use zero for "unset": a caller cannot distinguish an
/// explicit zero from an omitted field, and backends drop zeroes from the
/// outgoing vendor request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    /// Never empty once handed to a backend.
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: i64,
    pub top_p: f32,
    pub stop: Vec<String>,
    /// Accepted and threaded through; no backend streams yet.
    pub stream: bool,
}

/// A single-prompt text completion request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: i64,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// The role this message is sent as. Unknown roles are sent as `user`.
    pub fn role(&self) -> Role {
        Role::from_tag(&self.role)
    }
}

/// The role of a message sender, as understood by backends.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Case-sensitive: only the exact tags `system` and `assistant` are special.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// Provider-neutral result of a chat or completion call.
///
/// Lives for a single call only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResult {
    pub id: String,
    pub model: String,
    pub role: Option<String>,
    pub content: Option<String>,
    /// Set by backends that expose a dedicated completion text.
    pub text: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_tag() {
        assert_eq!(Role::from_tag("system"), Role::System);
        assert_eq!(Role::from_tag("assistant"), Role::Assistant);
        assert_eq!(Role::from_tag("user"), Role::User);
        assert_eq!(Role::from_tag("tool"), Role::User);
        assert_eq!(Role::from_tag("System"), Role::User);
        assert_eq!(Role::from_tag(""), Role::User);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_usage_serializes_camel_case() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 8,
            total_tokens: 18,
        };
        let json = serde_json::to_value(usage).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "promptTokens": 10,
                "completionTokens": 8,
                "totalTokens": 18
            })
        );
    }

    #[test]
    fn test_chat_message_user() {
        let msg = ChatMessage::user("hi");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.role(), Role::User);
    }
}
