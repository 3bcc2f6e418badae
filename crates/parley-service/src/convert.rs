//! Runtime messages to wire messages

use parley_ai::{Content, Message};
use parley_schema::{ChatMessage, ToolCall};

/// Convert a thread message into its wire form
pub fn to_chat_message(message: &Message) -> ChatMessage {
    match message {
        Message::User { .. } => ChatMessage::human(message.text()),
        Message::Assistant { content, metadata } => {
            let tool_calls = content
                .iter()
                .filter_map(|c| match c {
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => Some(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        args: arguments.clone(),
                    }),
                    _ => None,
                })
                .collect();
            let mut chat = ChatMessage::ai(message.text()).with_tool_calls(tool_calls);
            chat.id = metadata.id.clone();
            chat
        }
        Message::ToolResult {
            tool_call_id,
            tool_name,
            content,
            ..
        } => {
            let text = content
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            ChatMessage::tool(text, tool_call_id.clone()).with_name(tool_name.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_schema::MessageType;

    #[test]
    fn test_assistant_with_tool_calls() {
        let msg = Message::Assistant {
            content: vec![
                Content::text("Let me check"),
                Content::tool_call("call_1", "add", serde_json::json!({"a": 1})),
            ],
            metadata: Default::default(),
        }
        .with_id("run-abc");

        let chat = to_chat_message(&msg);
        assert_eq!(chat.kind, MessageType::Ai);
        assert_eq!(chat.content, "Let me check");
        assert_eq!(chat.tool_calls[0].name, "add");
        assert_eq!(chat.id.as_deref(), Some("run-abc"));
    }

    #[test]
    fn test_tool_result() {
        let msg = Message::tool_result("call_1", "add", vec![Content::text("2")], false);
        let chat = to_chat_message(&msg);
        assert_eq!(chat.kind, MessageType::Tool);
        assert_eq!(chat.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(chat.name.as_deref(), Some("add"));
        assert_eq!(chat.content, "2");
    }

    #[test]
    fn test_user() {
        let chat = to_chat_message(&Message::user("2+2?"));
        assert_eq!(chat.kind, MessageType::Human);
        assert_eq!(chat.content, "2+2?");
    }
}
