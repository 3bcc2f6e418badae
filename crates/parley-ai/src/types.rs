//! Messages, tools and endpoint settings exchanged with chat models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One chat model the host can route turns to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Key a client passes as `model` (e.g. "ollama")
    pub name: String,
    /// Model name the backend expects (e.g. "llama3.2")
    pub model_id: String,
    /// OpenAI-compatible API root; `/chat/completions` is appended
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sent with every completion request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ModelSpec {
    pub fn new(
        name: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model_id: model_id.into(),
            base_url: base_url.into(),
            api_key: None,
            temperature: None,
            max_tokens: None,
            headers: HashMap::new(),
        }
    }
}

/// Prompt and completion token counts reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
}

/// Why the model ended its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    /// Hit `max_tokens`
    Length,
    /// Wants one or more tools run before it continues
    ToolUse,
    Error,
}

/// A piece of a message: prose or a request to run a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text { text } = self {
            Some(text)
        } else {
            None
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// A turn in the model-facing conversation, tagged by `role` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: Vec<Content>,
        #[serde(default)]
        timestamp: i64,
    },
    Assistant {
        content: Vec<Content>,
        #[serde(flatten)]
        metadata: AssistantMetadata,
    },
    /// Output of a tool, answering the call with `tool_call_id`
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: Vec<Content>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        timestamp: i64,
    },
}

/// Bookkeeping carried by assistant replies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMetadata {
    /// Shared by every streamed delta of the reply and the finished reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![Content::text(text)],
            timestamp: now_millis(),
        }
    }

    /// A plain-text reply with no tool calls
    pub fn assistant(text: impl Into<String>) -> Self {
        let metadata = AssistantMetadata {
            timestamp: now_millis(),
            ..Default::default()
        };
        Self::Assistant {
            content: vec![Content::text(text)],
            metadata,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Vec<Content>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content,
            is_error,
            timestamp: now_millis(),
        }
    }

    /// Tag an assistant reply with its message id; other roles pass through
    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        if let Self::Assistant { metadata, .. } = &mut self {
            metadata.id = Some(message_id.into());
        }
        self
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Assistant { metadata, .. } => metadata.id.as_deref(),
            Self::User { .. } | Self::ToolResult { .. } => None,
        }
    }

    pub fn content(&self) -> &[Content] {
        match self {
            Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    /// `(id, name, arguments)` of each tool call in an assistant reply
    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        let Self::Assistant { content, .. } = self else {
            return Vec::new();
        };
        content
            .iter()
            .filter_map(|c| match c {
                Content::ToolCall {
                    id,
                    name,
                    arguments,
                } => Some((id.as_str(), name.as_str(), arguments)),
                Content::Text { .. } => None,
            })
            .collect()
    }

    /// All text pieces joined together
    pub fn text(&self) -> String {
        self.content().iter().filter_map(Content::as_text).collect()
    }
}

/// A function the model may call, described by a JSON Schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Everything sent to the model for one completion
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
}

impl Context {
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..Default::default()
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_skips_tool_calls() {
        let msg = Message::Assistant {
            content: vec![
                Content::text("Looking "),
                Content::tool_call("call_1", "search", serde_json::json!({"q": "x"})),
                Content::text("it up"),
            ],
            metadata: AssistantMetadata::default(),
        };
        assert_eq!(msg.text(), "Looking it up");
        assert_eq!(msg.tool_calls().len(), 1);
    }

    #[test]
    fn test_with_id_only_touches_assistant() {
        let ai = Message::assistant("hi").with_id("run-1");
        assert_eq!(ai.id(), Some("run-1"));

        let user = Message::user("hi").with_id("run-1");
        assert_eq!(user.id(), None);
    }

    #[test]
    fn test_message_serde_tagged_by_role() {
        let msg = Message::tool_result("call_1", "add", vec![Content::text("3")], false);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool_result");
        assert_eq!(json["tool_call_id"], "call_1");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
