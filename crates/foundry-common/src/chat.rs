//! Chat message types exchanged between the widget, the proxy and the upstream agent.
//!
//! The browser widget submits loosely-typed JSON. This module turns it into an
//! ordered list of [`ChatMessage`] values, coercing rather than rejecting odd
//! content so that a slightly malformed caller still gets an answer.
//!
//! # Examples
//!
//! ```
//! use foundry_common::chat::{ChatMessage, MessageRole};
//! use serde_json::json;
//!
//! let msg = ChatMessage::from_value(&json!({"role": "assistant", "content": 42}));
//! assert_eq!(msg.role, MessageRole::Assistant);
//! assert_eq!(msg.content, "42");
//!
//! // Missing role defaults to user, missing content to an empty string.
//! let msg = ChatMessage::from_value(&json!({}));
//! assert_eq!(msg.role, MessageRole::User);
//! assert_eq!(msg.content, "");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The author of a chat message.
///
/// Serializes to the lowercase role names the upstream Responses API expects.
///
/// ```
/// use foundry_common::chat::MessageRole;
///
/// let role = MessageRole::User;
/// let json = serde_json::to_string(&role).unwrap();
/// assert_eq!(json, "\"user\"");
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Messages typed by the merchant in the widget.
    #[default]
    User,

    /// Replies previously produced by the agent.
    Assistant,

    /// Instructions injected by the widget (page context, form options).
    System,
}

impl MessageRole {
    /// Parses a role name, case-insensitively.
    ///
    /// Unknown names yield `None`; callers decide the fallback.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// The wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn of the conversation.
///
/// Order matters: a `Vec<ChatMessage>` is the conversation in turn order and is
/// forwarded upstream unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: MessageRole,
    /// Plain-text content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Builds a message from an arbitrary JSON entry submitted by a caller.
    ///
    /// - objects contribute their `role` (default `user`, unknown names fall
    ///   back to `user`) and `content` (coerced with [`coerce_content`])
    /// - any other value becomes a user message whose content is the coerced value
    #[must_use]
    pub fn from_value(entry: &Value) -> Self {
        match entry {
            Value::Object(map) => {
                let role = map
                    .get("role")
                    .and_then(Value::as_str)
                    .and_then(MessageRole::parse)
                    .unwrap_or_default();
                let content = map.get("content").map(coerce_content).unwrap_or_default();
                Self { role, content }
            }
            other => Self::user(coerce_content(other)),
        }
    }
}

/// Coerces arbitrary JSON content into the string the upstream API requires.
///
/// Strings pass through, `null` becomes empty, scalars use their textual form
/// and structured values are serialized as compact JSON.
///
/// ```
/// use foundry_common::chat::coerce_content;
/// use serde_json::json;
///
/// assert_eq!(coerce_content(&json!("hi")), "hi");
/// assert_eq!(coerce_content(&json!(null)), "");
/// assert_eq!(coerce_content(&json!(true)), "true");
/// assert_eq!(coerce_content(&json!({"a": 1})), r#"{"a":1}"#);
/// ```
#[must_use]
pub fn coerce_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        structured => structured.to_string(),
    }
}
