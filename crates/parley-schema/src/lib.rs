//! parley-schema: the wire format between agent host and transcript client
//!
//! Request bodies, the flattened [`ChatMessage`], and the [`StreamUnit`]
//! sequence sent as server-sent events.

pub mod api;
pub mod message;
pub mod stream;
pub mod task;

pub use api::{
    AgentInfo, ChatHistory, ChatHistoryInput, Feedback, FeedbackResponse, RESERVED_CONFIG_KEYS,
    ServiceMetadata, StreamInput, UserInput,
};
pub use message::{ChatMessage, MessageType, SYNTHETIC_TOOL_ID_PREFIX, ToolCall};
pub use stream::{DONE_SENTINEL, StreamError, StreamUnit, parse_sse_body};
pub use task::{TaskData, TaskResult, TaskState};
