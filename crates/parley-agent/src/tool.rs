//! Tools an agent can call, and what a call hands back

use async_trait::async_trait;
use parley_ai::Content;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{error::Result, events::GraphEvent};

/// Outcome of one tool call.
///
/// With `interrupt` set the run pauses instead of answering the model; the
/// value the user resumes with becomes this call's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<serde_json::Value>,
}

impl ToolResult {
    fn new(content: Vec<Content>, is_error: bool) -> Self {
        Self {
            content,
            is_error,
            interrupt: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Content::text(text)], false)
    }

    /// Reported to the model as a failed call
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(vec![Content::text(message)], true)
    }

    pub fn interrupt(value: serde_json::Value) -> Self {
        Self {
            interrupt: Some(value),
            ..Self::new(Vec::new(), false)
        }
    }

    /// Text blocks, one per line
    pub fn text_content(&self) -> String {
        let texts: Vec<&str> = self.content.iter().filter_map(Content::as_text).collect();
        texts.join("\n")
    }
}

/// Writes out-of-band payloads into the run's custom event channel.
#[derive(Clone)]
pub struct CustomWriter {
    tx: mpsc::UnboundedSender<Result<GraphEvent>>,
}

impl CustomWriter {
    pub fn new(tx: mpsc::UnboundedSender<Result<GraphEvent>>) -> Self {
        Self { tx }
    }

    /// Send a payload; dropped silently if nobody is listening.
    pub fn write(&self, payload: serde_json::Value) {
        let _ = self.tx.send(Ok(GraphEvent::Custom { payload }));
    }
}

/// Per-call context handed to a tool
#[derive(Clone)]
pub struct ToolContext {
    pub tool_call_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub custom: CustomWriter,
}

/// Something a ReAct agent may call by name
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Shown to the model when it decides which tool to use
    fn description(&self) -> &str;

    /// JSON Schema the call's arguments are validated against
    fn parameters_schema(&self) -> serde_json::Value;

    /// Failures come back as [`ToolResult::error`], never as a run error
    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> ToolResult;
}

pub type BoxedTool = Arc<dyn Tool>;

/// The definition sent to the model for `tool`
pub fn to_api_tool(tool: &dyn Tool) -> parley_ai::Tool {
    parley_ai::Tool::new(tool.name(), tool.description(), tool.parameters_schema())
}

/// Asks the user a question and suspends the run until they answer.
pub struct AskHumanTool;

#[async_trait]
impl Tool for AskHumanTool {
    fn name(&self) -> &str {
        "ask_human"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question. Use when the request is ambiguous \
         or needs information only the user has. The user's reply is returned."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "Question to show the user" }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _ctx: &ToolContext) -> ToolResult {
        match arguments.get("question").and_then(|q| q.as_str()) {
            Some(question) => ToolResult::interrupt(serde_json::Value::String(question.into())),
            None => ToolResult::error("question is required"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (ToolContext, mpsc::UnboundedReceiver<Result<GraphEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ToolContext {
            tool_call_id: "call_1".into(),
            thread_id: "t1".into(),
            run_id: "r1".into(),
            custom: CustomWriter::new(tx),
        };
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_ask_human_interrupts_with_question() {
        let (ctx, _rx) = context();
        let result = AskHumanTool
            .execute(serde_json::json!({"question": "Which city?"}), &ctx)
            .await;
        assert_eq!(result.interrupt, Some(serde_json::json!("Which city?")));
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_ask_human_requires_question() {
        let (ctx, _rx) = context();
        let result = AskHumanTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
        assert!(result.interrupt.is_none());
    }

    #[tokio::test]
    async fn test_custom_writer_emits_custom_events() {
        let (ctx, mut rx) = context();
        ctx.custom.write(serde_json::json!({"name": "lookup", "state": "new"}));

        match rx.recv().await.unwrap().unwrap() {
            GraphEvent::Custom { payload } => assert_eq!(payload["state"], "new"),
            other => panic!("expected Custom, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_result_text() {
        let r = ToolResult::text("ok");
        assert!(!r.is_error);
        assert_eq!(r.text_content(), "ok");
    }

    #[test]
    fn test_to_api_tool() {
        let api_tool = to_api_tool(&AskHumanTool);
        assert_eq!(api_tool.name, "ask_human");
        assert_eq!(api_tool.parameters["required"][0], "question");
    }
}
