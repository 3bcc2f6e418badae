//! Stdio MCP client: one child process, line-delimited JSON-RPC

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::jsonrpc;

const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(String),
    #[error("MCP server error {code}: {message}")]
    JsonRpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },
    #[error("MCP protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    #[serde(default)]
    server_info: ServerInfo,
}

/// A tool as advertised by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Text blocks joined by newlines; other block kinds are skipped
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

struct StdioIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A running MCP server reached over its stdin/stdout
pub struct StdioMcpClient {
    name: String,
    io: Mutex<StdioIo>,
    child: Mutex<Child>,
    next_id: AtomicU64,
    server_info: ServerInfo,
    tools: Vec<ToolDefinition>,
}

impl StdioMcpClient {
    /// Spawn the server, run the initialize handshake and list its tools.
    #[tracing::instrument(skip_all, fields(server = name, %command))]
    pub async fn start(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut child = tokio::process::Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Transport(format!("failed to spawn {command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("no stdout".into()))?;

        let mut client = Self {
            name: name.to_string(),
            io: Mutex::new(StdioIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            server_info: ServerInfo::default(),
            tools: vec![],
        };

        let init = client
            .request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "parley", "version": env!("CARGO_PKG_VERSION") }
                })),
            )
            .await?;
        let init: InitializeResult = serde_json::from_value(init)
            .map_err(|e| McpError::Protocol(format!("bad initialize result: {e}")))?;
        if init.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                server = name,
                negotiated = %init.protocol_version,
                "MCP protocol version differs from requested"
            );
        }
        client.server_info = init.server_info;

        client.notify("notifications/initialized", None).await?;
        client.tools = client.list_tools().await?;

        tracing::info!(server = name, tools = client.tools.len(), "MCP server ready");
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page = self.request("tools/list", params).await?;

            let batch: Vec<ToolDefinition> = match page.get("tools") {
                Some(list) => serde_json::from_value(list.clone())
                    .map_err(|e| McpError::Protocol(format!("bad tools/list result: {e}")))?,
                None => vec![],
            };
            tools.extend(batch);

            match page.get("nextCursor").and_then(|v| v.as_str()) {
                Some(next) => cursor = Some(next.to_string()),
                None => return Ok(tools),
            }
        }
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .request(
                "tools/call",
                Some(serde_json::json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad tools/call result: {e}")))
    }

    async fn write_line(io: &mut StdioIo, payload: &impl Serialize) -> Result<(), McpError> {
        let mut line = serde_json::to_string(payload)
            .map_err(|e| McpError::Transport(format!("serialize: {e}")))?;
        line.push('\n');
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Transport(format!("write: {e}")))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(format!("flush: {e}")))
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = jsonrpc::Id::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = jsonrpc::Request::new(id.clone(), method, params);

        // One exchange at a time; the lock spans write and matching read
        let mut io = self.io.lock().await;
        Self::write_line(&mut io, &request).await?;

        loop {
            let mut line = String::new();
            let n = io
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::Transport(format!("read: {e}")))?;
            if n == 0 {
                return Err(McpError::Transport(format!("{} closed its output", self.name)));
            }

            // Server notifications and stray responses are skipped
            let Ok(response) = serde_json::from_str::<jsonrpc::Response>(&line) else {
                continue;
            };
            if !response.id_matches(&id) {
                continue;
            }
            if let Some(err) = response.error {
                return Err(McpError::JsonRpc {
                    code: err.code,
                    message: err.message,
                    data: err.data,
                });
            }
            return Ok(response.result.unwrap_or(serde_json::Value::Null));
        }
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<(), McpError> {
        let mut io = self.io.lock().await;
        Self::write_line(&mut io, &jsonrpc::Notification::new(method, params)).await
    }

    /// Close stdin and wait briefly, then kill the process.
    pub async fn shutdown(&self) {
        {
            let mut io = self.io.lock().await;
            let _ = io.stdin.shutdown().await;
        }

        let mut child = self.child.lock().await;
        if tokio::time::timeout(Duration::from_secs(2), child.wait())
            .await
            .is_err()
        {
            tracing::debug!(server = %self.name, "MCP server did not exit, killing");
            let _ = child.kill().await;
        }
    }
}
