//! Stream units and their server-sent-event framing

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::ChatMessage;

/// Data payload that closes a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Errors reading a stream unit off the wire
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Malformed stream unit: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream ended without [DONE]")]
    Truncated,
}

/// One atom of a streamed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamUnit {
    /// A text fragment of the AI message with id `message_id`
    Token {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// A complete message
    Message { content: ChatMessage },
    /// A problem the client should show inline
    Error { content: String },
    /// End of stream; framed as the bare sentinel, never as JSON
    #[serde(skip)]
    Done,
}

impl StreamUnit {
    pub fn token(content: impl Into<String>, message_id: Option<String>) -> Self {
        Self::Token {
            content: content.into(),
            message_id,
        }
    }

    pub fn message(message: ChatMessage) -> Self {
        Self::Message { content: message }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// The `data:` payload for this unit
    pub fn to_data(&self) -> String {
        match self {
            StreamUnit::Done => DONE_SENTINEL.to_string(),
            // Serializing a derived enum of strings and JSON values cannot fail
            unit => serde_json::to_string(unit).unwrap_or_default(),
        }
    }

    /// A complete SSE event: `data: <payload>\n\n`
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_data())
    }

    /// Parse one `data:` payload
    pub fn from_data(data: &str) -> Result<Self, StreamError> {
        let data = data.trim();
        if data == DONE_SENTINEL {
            return Ok(StreamUnit::Done);
        }
        Ok(serde_json::from_str(data)?)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamUnit::Done)
    }
}

/// Split a complete SSE body into units, ignoring comments and blank lines.
///
/// Fails with [`StreamError::Truncated`] if the body does not end with the
/// sentinel.
pub fn parse_sse_body(body: &str) -> Result<Vec<StreamUnit>, StreamError> {
    let mut units = vec![];
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let unit = StreamUnit::from_data(data)?;
        let done = unit.is_done();
        units.push(unit);
        if done {
            return Ok(units);
        }
    }
    Err(StreamError::Truncated)
}
