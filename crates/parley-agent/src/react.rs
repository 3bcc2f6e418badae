//! ReAct-style tool-calling graph

use async_trait::async_trait;
use futures::StreamExt;
use parley_ai::{ChatModel, Content, Context, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::{
    checkpoint::{Checkpointer, PendingInterrupt, QueuedCall, ThreadState},
    error::{Error, Result},
    events::{GraphEvent, GraphEventStream, Interrupt, START_NODE, TokenChunk},
    graph::{AgentGraph, GraphInput, RunConfig, StateSnapshot},
    tool::{BoxedTool, CustomWriter, ToolContext, ToolResult, to_api_tool},
    transport::{ModelTransport, RetryConfig, TransportEvent},
};

/// Node that calls the model
pub const AGENT_NODE: &str = "agent";

/// Node that executes tool calls
pub const TOOLS_NODE: &str = "tools";

/// Default bound on model calls per run
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Answer given when a run hits its step bound
pub const MAX_STEPS_REPLY: &str = "Sorry, need more steps to process this request.";

type EventSender = mpsc::UnboundedSender<Result<GraphEvent>>;

/// A graph that alternates model calls and tool execution until the model
/// answers without tool calls.
///
/// Every instance shares its checkpointer with the caller, so state written
/// by one instance is visible to any other built on the same store.
#[derive(Clone)]
pub struct ReactAgent {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    system_prompt: Option<String>,
    max_steps: usize,
    stream_tags: Vec<String>,
    transport: ModelTransport,
    tools: Vec<BoxedTool>,
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
    checkpointer: Arc<dyn Checkpointer>,
}

/// Builder for [`ReactAgent`]
pub struct ReactAgentBuilder {
    name: String,
    model: Arc<dyn ChatModel>,
    checkpointer: Arc<dyn Checkpointer>,
    system_prompt: Option<String>,
    max_steps: usize,
    stream_tags: Vec<String>,
    retry: RetryConfig,
    tools: Vec<BoxedTool>,
}

impl ReactAgentBuilder {
    /// System prompt; `{date}` is replaced with today's date on every run
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Tags attached to every token chunk this graph emits
    pub fn stream_tags(mut self, tags: Vec<String>) -> Self {
        self.stream_tags = tags;
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn tool(mut self, tool: BoxedTool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = BoxedTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn build(self) -> ReactAgent {
        let mut schema_cache = HashMap::new();
        for tool in &self.tools {
            match jsonschema::validator_for(&tool.parameters_schema()) {
                Ok(validator) => {
                    schema_cache.insert(tool.name().to_string(), Arc::new(validator));
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid tool parameter schema for '{}', skipping validation: {}",
                        tool.name(),
                        e
                    );
                }
            }
        }

        ReactAgent {
            inner: Arc::new(Inner {
                name: self.name,
                system_prompt: self.system_prompt,
                max_steps: self.max_steps,
                stream_tags: self.stream_tags,
                transport: ModelTransport::new(self.model).with_retry_config(self.retry),
                tools: self.tools,
                schema_cache,
                checkpointer: self.checkpointer,
            }),
        }
    }
}

impl ReactAgent {
    pub fn builder(
        name: impl Into<String>,
        model: Arc<dyn ChatModel>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> ReactAgentBuilder {
        ReactAgentBuilder {
            name: name.into(),
            model,
            checkpointer,
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            stream_tags: vec![],
            retry: RetryConfig::default(),
            tools: vec![],
        }
    }

    /// Get tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.inner.tools.iter().map(|t| t.name()).collect()
    }
}

#[async_trait]
impl AgentGraph for ReactAgent {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn get_state(&self, thread_id: &str) -> Result<StateSnapshot> {
        let state = self.inner.checkpointer.load(thread_id).await?;
        Ok(state
            .map(|s| StateSnapshot {
                messages: s.messages,
                interrupts: s.pending.map(|p| vec![p.interrupt]).unwrap_or_default(),
            })
            .unwrap_or_default())
    }

    fn stream(&self, input: GraphInput, config: RunConfig) -> GraphEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();

        // The run owns its task so it finishes and checkpoints even if the
        // consumer stops reading.
        tokio::spawn(async move {
            if let Err(e) = inner.run(input, &config, &tx).await {
                tracing::error!(
                    graph = %inner.name,
                    thread_id = %config.thread_id,
                    "run failed: {}",
                    e
                );
                let _ = tx.send(Err(e));
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

fn emit(tx: &EventSender, event: GraphEvent) {
    let _ = tx.send(Ok(event));
}

/// How a tool phase ended
enum ToolPhase {
    Done(Vec<Message>),
    Interrupted(Vec<Message>, PendingInterrupt),
}

impl Inner {
    async fn run(&self, input: GraphInput, config: &RunConfig, tx: &EventSender) -> Result<()> {
        let thread_id = config.thread_id.as_str();
        let mut state = self
            .checkpointer
            .load(thread_id)
            .await?
            .unwrap_or_default();

        match input {
            GraphInput::Messages(messages) => {
                if state.pending.is_some() {
                    return Err(Error::ThreadInterrupted(thread_id.to_string()));
                }
                tracing::debug!(thread_id, count = messages.len(), "starting run");
                state.messages.extend(messages.iter().cloned());
                emit(tx, GraphEvent::update(START_NODE, messages));
            }
            GraphInput::Resume(value) => {
                let pending = state
                    .pending
                    .take()
                    .ok_or_else(|| Error::NoPendingInterrupt(thread_id.to_string()))?;
                tracing::debug!(thread_id, tool = %pending.tool_name, "resuming run");

                let answer = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                let mut results = vec![Message::tool_result(
                    &pending.tool_call_id,
                    &pending.tool_name,
                    vec![Content::text(answer)],
                    false,
                )];

                let interrupted = match self.execute_tool_calls(pending.remaining, config, tx).await
                {
                    ToolPhase::Done(more) => {
                        results.extend(more);
                        None
                    }
                    ToolPhase::Interrupted(more, next) => {
                        results.extend(more);
                        Some(next)
                    }
                };
                if self.finish_tool_phase(&mut state, results, interrupted, config, tx).await? {
                    return Ok(());
                }
            }
        }

        for _ in 0..self.max_steps {
            let reply = self.call_model(&state.messages, tx).await?;
            state.messages.push(reply.clone());
            emit(tx, GraphEvent::update(AGENT_NODE, vec![reply.clone()]));

            let calls: Vec<QueuedCall> = reply
                .tool_calls()
                .into_iter()
                .map(|(id, name, arguments)| QueuedCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.clone(),
                })
                .collect();

            if calls.is_empty() {
                self.checkpointer.save(thread_id, &state).await?;
                emit(tx, GraphEvent::Values { messages: state.messages });
                return Ok(());
            }

            self.checkpointer.save(thread_id, &state).await?;

            let (results, interrupted) = match self.execute_tool_calls(calls, config, tx).await {
                ToolPhase::Done(results) => (results, None),
                ToolPhase::Interrupted(results, pending) => (results, Some(pending)),
            };
            if self.finish_tool_phase(&mut state, results, interrupted, config, tx).await? {
                return Ok(());
            }
        }

        tracing::warn!(thread_id, max_steps = self.max_steps, "step limit reached");
        let reply = Message::assistant(MAX_STEPS_REPLY).with_id(new_message_id());
        state.messages.push(reply.clone());
        emit(tx, GraphEvent::update(AGENT_NODE, vec![reply]));
        self.checkpointer.save(thread_id, &state).await?;
        emit(tx, GraphEvent::Values { messages: state.messages });
        Ok(())
    }

    /// Record tool results; returns true if the run suspended.
    async fn finish_tool_phase(
        &self,
        state: &mut ThreadState,
        results: Vec<Message>,
        interrupted: Option<PendingInterrupt>,
        config: &RunConfig,
        tx: &EventSender,
    ) -> Result<bool> {
        state.messages.extend(results.iter().cloned());
        if !results.is_empty() {
            emit(tx, GraphEvent::update(TOOLS_NODE, results));
        }

        let suspended = match interrupted {
            Some(pending) => {
                let interrupt = pending.interrupt.clone();
                state.pending = Some(pending);
                self.checkpointer.save(&config.thread_id, state).await?;
                tracing::info!(thread_id = %config.thread_id, "run interrupted");
                emit(
                    tx,
                    GraphEvent::Interrupt {
                        interrupts: vec![interrupt],
                    },
                );
                true
            }
            None => {
                self.checkpointer.save(&config.thread_id, state).await?;
                false
            }
        };
        Ok(suspended)
    }

    fn build_context(&self, messages: &[Message]) -> Context {
        let system_prompt = self.system_prompt.as_ref().map(|p| {
            p.replace(
                "{date}",
                &chrono::Local::now().format("%B %d, %Y").to_string(),
            )
        });
        Context {
            system_prompt,
            messages: messages.to_vec(),
            tools: self.tools.iter().map(|t| to_api_tool(t.as_ref())).collect(),
        }
    }

    /// One model call; tokens are forwarded under the id the finished
    /// message is stored with.
    async fn call_model(&self, messages: &[Message], tx: &EventSender) -> Result<Message> {
        let message_id = new_message_id();
        let mut events = self.transport.run(self.build_context(messages));

        while let Some(event) = events.next().await {
            match event {
                TransportEvent::TextDelta(text) => emit(
                    tx,
                    GraphEvent::Token {
                        chunk: TokenChunk {
                            message_id: message_id.clone(),
                            node: AGENT_NODE.to_string(),
                            text,
                            tags: self.stream_tags.clone(),
                        },
                    },
                ),
                TransportEvent::Finished(message) => return Ok(message.with_id(message_id)),
                TransportEvent::Failed(e) => return Err(Error::Model(e)),
            }
        }
        Err(Error::Model(format!(
            "{} produced no response",
            self.transport.model_name()
        )))
    }

    async fn execute_tool_calls(
        &self,
        calls: Vec<QueuedCall>,
        config: &RunConfig,
        tx: &EventSender,
    ) -> ToolPhase {
        let mut results = vec![];

        for (idx, call) in calls.iter().enumerate() {
            let result = self.execute_tool(call, config, tx).await;

            if let Some(value) = result.interrupt {
                let pending = PendingInterrupt {
                    interrupt: Interrupt {
                        id: format!("int-{}", Uuid::new_v4()),
                        value,
                    },
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    remaining: calls[idx + 1..].to_vec(),
                };
                return ToolPhase::Interrupted(results, pending);
            }

            results.push(Message::tool_result(
                &call.id,
                &call.name,
                result.content,
                result.is_error,
            ));
        }

        ToolPhase::Done(results)
    }

    async fn execute_tool(&self, call: &QueuedCall, config: &RunConfig, tx: &EventSender) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            tracing::warn!(tool = %call.name, "model called an unknown tool");
            return ToolResult::error(format!("Tool not found: {}", call.name));
        };

        if let Some(err) = self
            .schema_cache
            .get(&call.name)
            .and_then(|validator| validate_with_validator(&call.arguments, validator))
        {
            return ToolResult::error(err);
        }

        let ctx = ToolContext {
            tool_call_id: call.id.clone(),
            thread_id: config.thread_id.clone(),
            run_id: config.run_id.clone(),
            custom: CustomWriter::new(tx.clone()),
        };
        tracing::debug!(tool = %call.name, tool_call_id = %call.id, "executing tool");
        tool.execute(call.arguments.clone(), &ctx).await
    }
}

fn new_message_id() -> String {
    format!("run-{}", Uuid::new_v4())
}

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}
