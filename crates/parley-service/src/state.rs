//! Application context shared by every handler

use anyhow::Context as _;
use parley_agent::{BoxedTool, Checkpointer, FileCheckpointer, MemoryCheckpointer, mcp};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    config::{CheckpointKind, ServiceConfig},
    feedback::{FeedbackSink, sink_from_config},
    registry::{AgentRegistry, GraphBuilder, build_react_graph},
};

/// Created once at startup and torn down with [`AppState::shutdown`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub registry: Arc<AgentRegistry>,
    pub feedback: Arc<dyn FeedbackSink>,
    mcp_clients: Arc<Vec<Arc<mcp::StdioMcpClient>>>,
}

impl AppState {
    /// Open the checkpoint store, start MCP servers and set up the registry.
    ///
    /// A tool server that fails to start is logged and left out.
    pub async fn start(config: ServiceConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let checkpointer: Arc<dyn Checkpointer> = match config.checkpoint.kind {
            CheckpointKind::Memory => Arc::new(MemoryCheckpointer::new()),
            CheckpointKind::File => {
                let dir = config.checkpoint.resolved_dir();
                let store = FileCheckpointer::open(&dir)
                    .with_context(|| format!("Failed to open checkpoint dir {}", dir.display()))?;
                tracing::info!("Checkpoints stored in {}", dir.display());
                Arc::new(store)
            }
        };

        let mut clients = vec![];
        let mut server_tools: HashMap<String, Vec<BoxedTool>> = HashMap::new();
        for server in &config.mcp_servers {
            match mcp::StdioMcpClient::start(&server.name, &server.command, &server.args, &server.env)
                .await
            {
                Ok(client) => {
                    let client = Arc::new(client);
                    let tools = mcp::tools_for(&client);
                    if tools.is_empty() {
                        tracing::warn!("No tools were returned from MCP server {}", server.name);
                    }
                    server_tools.insert(server.name.clone(), tools);
                    clients.push(client);
                }
                Err(e) => {
                    tracing::warn!("Failed to start MCP server {}: {}", server.name, e);
                }
            }
        }

        let registry = AgentRegistry::new(
            config.clone(),
            checkpointer,
            server_tools,
            Box::new(build_react_graph),
        );
        let feedback: Arc<dyn FeedbackSink> = Arc::from(sink_from_config(&config.feedback));

        Ok(Self {
            config,
            registry: Arc::new(registry),
            feedback,
            mcp_clients: Arc::new(clients),
        })
    }

    /// Assemble a state from parts, without tool servers
    pub fn from_parts(
        config: ServiceConfig,
        checkpointer: Arc<dyn Checkpointer>,
        builder: GraphBuilder,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = AgentRegistry::new(config.clone(), checkpointer, HashMap::new(), builder);
        Self {
            config,
            registry: Arc::new(registry),
            feedback,
            mcp_clients: Arc::new(vec![]),
        }
    }

    /// Stop every tool server process
    pub async fn shutdown(&self) {
        for client in self.mcp_clients.iter() {
            tracing::info!("Stopping MCP server {}", client.name());
            client.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckpointConfig, McpServerConfig};

    #[tokio::test]
    async fn test_start_skips_failing_tool_server() {
        let mut config = ServiceConfig::default();
        config.mcp_servers.push(McpServerConfig {
            name: "broken".into(),
            command: "/nonexistent/mcp-server".into(),
            args: vec![],
            env: HashMap::new(),
        });
        config.agents[0].mcp_servers.push("broken".into());

        let state = AppState::start(config).await.unwrap();
        assert!(state.mcp_clients.is_empty());
        assert!(state.registry.get("research-assistant", None).await.is_ok());
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_file_checkpoints_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.checkpoint = CheckpointConfig {
            kind: CheckpointKind::File,
            dir: Some(dir.path().join("threads")),
        };

        let state = AppState::start(config).await.unwrap();
        state
            .registry
            .checkpointer()
            .save("t1", &Default::default())
            .await
            .unwrap();
        assert!(dir.path().join("threads").join("t1.json").exists());
    }
}
