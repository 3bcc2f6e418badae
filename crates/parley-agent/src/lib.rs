//! parley-agent: agent graph runtime
//!
//! The [`AgentGraph`] contract the service drives, the events a run emits,
//! thread checkpoints with interrupt bookkeeping, a ReAct-style tool-calling
//! graph and MCP stdio tool servers.

pub mod checkpoint;
pub mod error;
pub mod events;
pub mod graph;
pub mod mcp;
pub mod react;
pub mod tool;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use checkpoint::{Checkpointer, FileCheckpointer, MemoryCheckpointer, ThreadState};
pub use error::{Error, Result};
pub use events::{GraphEvent, GraphEventStream, Interrupt, SKIP_STREAM_TAG, START_NODE, TokenChunk};
pub use graph::{AgentGraph, GraphInput, InvokeOutcome, RunConfig, StateSnapshot};
pub use react::{AGENT_NODE, ReactAgent, ReactAgentBuilder, TOOLS_NODE};
pub use tool::{AskHumanTool, BoxedTool, CustomWriter, Tool, ToolContext, ToolResult};
pub use transport::RetryConfig;
