//! Remote MCP tools exposed through the local `Tool` trait

use async_trait::async_trait;
use std::sync::Arc;

use super::client::{StdioMcpClient, ToolDefinition};
use crate::tool::{BoxedTool, Tool, ToolContext, ToolResult};

/// One tool living on an MCP server
pub struct McpTool {
    client: Arc<StdioMcpClient>,
    definition: ToolDefinition,
}

impl McpTool {
    pub fn new(client: Arc<StdioMcpClient>, definition: ToolDefinition) -> Self {
        Self { client, definition }
    }
}

/// Wrap every tool a server advertises
pub fn tools_for(client: &Arc<StdioMcpClient>) -> Vec<BoxedTool> {
    client
        .tools()
        .iter()
        .map(|def| Arc::new(McpTool::new(client.clone(), def.clone())) as BoxedTool)
        .collect()
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.definition.input_schema.clone()
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        match self.client.call_tool(&self.definition.name, arguments).await {
            Ok(result) if result.is_error => ToolResult::error(result.text()),
            Ok(result) => ToolResult::text(result.text()),
            Err(e) => {
                tracing::warn!(
                    server = %self.client.name(),
                    tool = %self.definition.name,
                    tool_call_id = %ctx.tool_call_id,
                    "MCP tool call failed: {}",
                    e
                );
                ToolResult::error(e.to_string())
            }
        }
    }
}
