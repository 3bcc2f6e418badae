//! MCP tool servers over stdio

mod client;
mod jsonrpc;
mod tool;

pub use client::{CallToolResult, ContentBlock, McpError, ServerInfo, StdioMcpClient, ToolDefinition};
pub use tool::{McpTool, tools_for};
