//! The flattened chat message every client renders

use serde::{Deserialize, Serialize};

/// Prefix of tool call ids the host assigns when a tool message has none
pub const SYNTHETIC_TOOL_ID_PREFIX: &str = "temp_tool_";

/// Discriminant of a [`ChatMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Ai,
    Tool,
    Custom,
}

/// A tool invocation requested by an `ai` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A message on the wire.
///
/// `tool_calls` only appears on `ai` messages, `tool_call_id` only on `tool`
/// messages and `custom_data` only on `custom` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    /// Producer of a tool message, e.g. the sub-agent that answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Id shared with the token units that streamed this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom_data: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    fn new(kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            run_id: None,
            name: None,
            id: None,
            custom_data: serde_json::Map::new(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageType::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageType::Ai, content)
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(MessageType::Tool, content)
        }
    }

    pub fn custom(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            custom_data: data,
            ..Self::new(MessageType::Custom, "")
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_ai(&self) -> bool {
        self.kind == MessageType::Ai
    }

    /// Tool call id, treating an empty string as missing
    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether the tool call id was assigned by the host rather than the model
    pub fn has_synthetic_tool_call_id(&self) -> bool {
        self.tool_call_id()
            .is_some_and(|id| id.starts_with(SYNTHETIC_TOOL_ID_PREFIX))
    }

    /// Short human-readable rendering, used in logs and plain output
    pub fn pretty_repr(&self) -> String {
        let title = match self.kind {
            MessageType::Human => "Human Message",
            MessageType::Ai => "Ai Message",
            MessageType::Tool => "Tool Message",
            MessageType::Custom => "Custom Message",
        };
        let mut out = format!("{}\n\n{}", title, self.content);
        for call in &self.tool_calls {
            out.push_str(&format!("\n  {} ({}) {}", call.name, call.id, call.args));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_message_wire_shape() {
        let msg = ChatMessage::ai("4")
            .with_run_id("r1")
            .with_tool_calls(vec![ToolCall {
                id: "call_1".into(),
                name: "add".into(),
                args: serde_json::json!({"a": 2}),
            }]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ai");
        assert_eq!(json["run_id"], "r1");
        assert_eq!(json["tool_calls"][0]["args"]["a"], 2);
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("custom_data").is_none());
    }

    #[test]
    fn test_minimal_message_parses() {
        let msg: ChatMessage = serde_json::from_str(r#"{"type":"tool","content":"ok","tool_call_id":""}"#).unwrap();
        assert_eq!(msg.kind, MessageType::Tool);
        assert!(msg.tool_calls.is_empty());
        assert_eq!(msg.tool_call_id(), None);
        assert_eq!(msg.run_id, None);
    }

    #[test]
    fn test_custom_message_keeps_data() {
        let mut data = serde_json::Map::new();
        data.insert("name".into(), serde_json::json!("search"));
        let msg = ChatMessage::custom(data);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "custom");
        assert_eq!(json["custom_data"]["name"], "search");
    }

    #[test]
    fn test_pretty_repr_lists_tool_calls() {
        let msg = ChatMessage::ai("").with_tool_calls(vec![ToolCall {
            id: "c1".into(),
            name: "search".into(),
            args: serde_json::json!({}),
        }]);
        assert!(msg.pretty_repr().contains("search (c1)"));
    }
}
