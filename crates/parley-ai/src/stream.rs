//! Incremental model output and reassembly of partial replies

use crate::types::{AssistantMetadata, Content, Message, StopReason, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// What a backend emits while a reply is being generated.
///
/// `content_index` addresses the content block a delta belongs to, so text
/// and several tool calls can interleave in one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEvent {
    Start { message: Message },
    TextDelta { content_index: usize, delta: String },
    ToolCallStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// A fragment of the call's JSON arguments
    ToolCallDelta { content_index: usize, delta: String },
    Done {
        message: Message,
        stop_reason: StopReason,
        usage: Usage,
    },
    Error {
        message: String,
        #[serde(default)]
        retryable: bool,
    },
}

pub type MessageEventStream = Pin<Box<dyn Stream<Item = MessageEvent> + Send>>;

/// Accumulates deltas into an assistant reply.
///
/// A backend that hangs up before `Done` still leaves the text and tool
/// calls received so far.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    blocks: Vec<Block>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

#[derive(Debug)]
enum Block {
    Text(String),
    Call {
        id: String,
        name: String,
        raw_args: String,
    },
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_event(&mut self, event: &MessageEvent) {
        match event {
            MessageEvent::TextDelta {
                content_index,
                delta,
            } => {
                if let Block::Text(text) = self.block(*content_index) {
                    text.push_str(delta);
                }
            }
            MessageEvent::ToolCallStart {
                content_index,
                id,
                name,
            } => {
                *self.block(*content_index) = Block::Call {
                    id: id.clone(),
                    name: name.clone(),
                    raw_args: String::new(),
                };
            }
            MessageEvent::ToolCallDelta {
                content_index,
                delta,
            } => {
                if let Some(Block::Call { raw_args, .. }) = self.blocks.get_mut(*content_index) {
                    raw_args.push_str(delta);
                }
            }
            MessageEvent::Done {
                stop_reason, usage, ..
            } => {
                self.stop_reason = Some(*stop_reason);
                self.usage = usage.clone();
            }
            MessageEvent::Start { .. } | MessageEvent::Error { .. } => {}
        }
    }

    /// Text received so far
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if let Block::Text(text) = block {
                out.push_str(text);
            }
        }
        out
    }

    /// Unparseable tool arguments become `{}`; empty text blocks are dropped
    pub fn build(self) -> Message {
        let mut content = Vec::with_capacity(self.blocks.len());
        for block in self.blocks {
            match block {
                Block::Text(text) if text.is_empty() => {}
                Block::Text(text) => content.push(Content::Text { text }),
                Block::Call { id, name, raw_args } => {
                    let arguments = serde_json::from_str(&raw_args)
                        .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
                    content.push(Content::tool_call(id, name, arguments));
                }
            }
        }

        let metadata = AssistantMetadata {
            usage: self.usage,
            stop_reason: self.stop_reason,
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        };
        Message::Assistant { content, metadata }
    }

    /// The block at `index`, padding with empty text blocks as needed
    fn block(&mut self, index: usize) -> &mut Block {
        if self.blocks.len() <= index {
            self.blocks.resize_with(index + 1, || Block::Text(String::new()));
        }
        &mut self.blocks[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_concatenates_text_deltas() {
        let mut builder = MessageBuilder::new();
        for delta in ["The ", "answer ", "is 4"] {
            builder.process_event(&MessageEvent::TextDelta {
                content_index: 0,
                delta: delta.into(),
            });
        }
        assert_eq!(builder.text(), "The answer is 4");
        assert_eq!(builder.build().text(), "The answer is 4");
    }

    #[test]
    fn test_builder_assembles_tool_call_arguments() {
        let mut builder = MessageBuilder::new();
        builder.process_event(&MessageEvent::ToolCallStart {
            content_index: 1,
            id: "call_1".into(),
            name: "add".into(),
        });
        builder.process_event(&MessageEvent::ToolCallDelta {
            content_index: 1,
            delta: "{\"a\": 1,".into(),
        });
        builder.process_event(&MessageEvent::ToolCallDelta {
            content_index: 1,
            delta: " \"b\": 2}".into(),
        });

        let msg = builder.build();
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "call_1");
        assert_eq!(calls[0].2, &serde_json::json!({"a": 1, "b": 2}));
    }
}
