//! Events emitted while an agent graph runs

use parley_ai::Message;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::Result;

/// Tag that keeps a model call's tokens out of client token streams
pub const SKIP_STREAM_TAG: &str = "skip_stream";

/// Node name used for the echo of the turn's input
pub const START_NODE: &str = "__start__";

/// A suspension raised mid-run, waiting for a resume value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub value: serde_json::Value,
}

impl Interrupt {
    /// The interrupt value rendered as plain text
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One token from a model call, tagged with the message it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChunk {
    /// Id of the assistant message being generated
    pub message_id: String,
    /// Node that made the model call
    pub node: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TokenChunk {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Everything a running graph reports, one variant per stream mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GraphEvent {
    /// New messages produced by one execution step
    Update { node: String, messages: Vec<Message> },
    /// Execution stopped and needs a resume value
    Interrupt { interrupts: Vec<Interrupt> },
    /// A model token
    Token { chunk: TokenChunk },
    /// Out-of-band payload written by a tool or node
    Custom { payload: serde_json::Value },
    /// Full thread messages once the run completed
    Values { messages: Vec<Message> },
}

impl GraphEvent {
    pub fn update(node: impl Into<String>, messages: Vec<Message>) -> Self {
        Self::Update {
            node: node.into(),
            messages,
        }
    }

    /// Check if this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraphEvent::Interrupt { .. } | GraphEvent::Values { .. })
    }
}

/// A stream of graph events; an `Err` item means execution failed
pub type GraphEventStream = Pin<Box<dyn Stream<Item = Result<GraphEvent>> + Send>>;
