//! Request and response bodies of the agent host

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

/// Keys the host sets itself; `agent_config` may not contain them
pub const RESERVED_CONFIG_KEYS: [&str; 2] = ["thread_id", "model"];

/// Body of `/invoke`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    /// User text, or the resume value for an interrupted thread
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Omitted on the first turn of a new conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl UserInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Reserved keys present in `agent_config`, sorted
    pub fn reserved_key_collisions(&self) -> Vec<&str> {
        let Some(config) = &self.agent_config else {
            return vec![];
        };
        let mut keys: Vec<&str> = RESERVED_CONFIG_KEYS
            .iter()
            .copied()
            .filter(|k| config.contains_key(*k))
            .collect();
        keys.sort_unstable();
        keys
    }
}

fn default_stream_tokens() -> bool {
    true
}

/// Body of `/stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInput {
    #[serde(flatten)]
    pub input: UserInput,
    #[serde(default = "default_stream_tokens")]
    pub stream_tokens: bool,
}

impl StreamInput {
    pub fn new(input: UserInput, stream_tokens: bool) -> Self {
        Self {
            input,
            stream_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryInput {
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
}

/// Rating of a run, forwarded to the feedback recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub run_id: String,
    pub key: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub status: String,
}

impl Default for FeedbackResponse {
    fn default() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub key: String,
    pub description: String,
}

/// Body of `/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub agents: Vec<AgentInfo>,
    pub models: Vec<String>,
    pub default_agent: String,
    pub default_model: String,
}
