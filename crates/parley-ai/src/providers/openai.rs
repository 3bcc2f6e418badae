//! Streaming `/chat/completions` client.
//!
//! Chunks are translated into [`MessageEvent`]s as they arrive. Tool call
//! fragments are keyed by the chunk's `index`; text always sits in content
//! block 0, so call `i` becomes block `i + 1`.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::ChatModel;
use crate::{
    error::{Error, Result},
    stream::{MessageBuilder, MessageEvent, MessageEventStream},
    types::{AssistantMetadata, Content, Context, Message, ModelSpec, StopReason, Usage},
};

pub struct OpenAICompatProvider {
    client: reqwest::Client,
    spec: ModelSpec,
}

impl OpenAICompatProvider {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            client: reqwest::Client::new(),
            spec,
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn build_request(&self, context: &Context) -> ChatRequest {
        let mut messages = Vec::new();

        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(ChatRequestMessage {
                role: "system",
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.extend(context.messages.iter().map(convert_message));

        let tools: Vec<ChatTool> = context
            .tools
            .iter()
            .map(|t| ChatTool {
                tool_type: "function",
                function: ChatFunction {
                    name: t.name.clone(),
                    description: Some(t.description.clone()),
                    parameters: Some(t.parameters.clone()),
                },
            })
            .collect();

        ChatRequest {
            model: self.spec.model_id.clone(),
            messages,
            stream: true,
            max_tokens: self.spec.max_tokens,
            temperature: self.spec.temperature,
            tool_choice: (!tools.is_empty()).then(|| serde_json::json!("auto")),
            tools: (!tools.is_empty()).then_some(tools),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn stream(&self, context: &Context) -> Result<MessageEventStream> {
        let request = self.build_request(context);
        let url = format!(
            "{}/chat/completions",
            self.spec.base_url.trim_end_matches('/')
        );

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.spec.api_key {
            builder = builder.bearer_auth(key);
        }
        for (key, value) in &self.spec.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let event_source = EventSource::new(builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        tracing::debug!(model = %self.spec.model_id, %url, "streaming chat completion");
        Ok(Box::pin(create_stream(
            event_source,
            self.spec.model_id.clone(),
        )))
    }
}

fn convert_message(msg: &Message) -> ChatRequestMessage {
    match msg {
        Message::User { .. } => ChatRequestMessage {
            role: "user",
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, .. } => {
            let tool_calls: Vec<ChatToolCall> = content
                .iter()
                .filter_map(|c| match c {
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    } => Some(ChatToolCall {
                        id: id.clone(),
                        call_type: "function",
                        function: ChatFunctionCall {
                            name: name.clone(),
                            arguments: arguments.to_string(),
                        },
                    }),
                    Content::Text { .. } => None,
                })
                .collect();
            let text = msg.text();

            ChatRequestMessage {
                role: "assistant",
                content: (!text.is_empty()).then_some(text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }
        }
        Message::ToolResult { tool_call_id, .. } => ChatRequestMessage {
            role: "tool",
            content: Some(msg.text()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

/// Id and name of a call; the start event waits until the name is known
#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    started: bool,
}

fn create_stream(
    mut event_source: EventSource,
    model_id: String,
) -> impl futures::Stream<Item = MessageEvent> {
    stream! {
        let mut reply = MessageBuilder::new();
        let mut calls: Vec<PendingCall> = Vec::new();
        let mut finish_reason: Option<String> = None;
        let mut usage = Usage::default();

        yield MessageEvent::Start {
            message: Message::Assistant {
                content: vec![],
                metadata: AssistantMetadata {
                    model: Some(model_id.clone()),
                    ..Default::default()
                },
            },
        };

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    let chunk: StreamChunk = match serde_json::from_str(&msg.data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield MessageEvent::Error {
                                message: format!("Failed to parse chunk: {}", e),
                                retryable: false,
                            };
                            event_source.close();
                            return;
                        }
                    };

                    for choice in chunk.choices {
                        if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                            let event = MessageEvent::TextDelta { content_index: 0, delta };
                            reply.process_event(&event);
                            yield event;
                        }

                        for tc in choice.delta.tool_calls.unwrap_or_default() {
                            let idx = tc.index;
                            if calls.len() <= idx {
                                calls.resize_with(idx + 1, PendingCall::default);
                            }
                            let call = &mut calls[idx];
                            if let Some(id) = tc.id {
                                call.id = id;
                            }
                            if let Some(function) = tc.function {
                                if let Some(name) = function.name {
                                    call.name = name;
                                }
                                if !call.started && !call.name.is_empty() {
                                    call.started = true;
                                    let event = MessageEvent::ToolCallStart {
                                        content_index: idx + 1,
                                        id: call.id.clone(),
                                        name: call.name.clone(),
                                    };
                                    reply.process_event(&event);
                                    yield event;
                                }
                                if let Some(delta) = function.arguments.filter(|a| !a.is_empty()) {
                                    let event = MessageEvent::ToolCallDelta {
                                        content_index: idx + 1,
                                        delta,
                                    };
                                    reply.process_event(&event);
                                    yield event;
                                }
                            }
                        }

                        if let Some(reason) = choice.finish_reason {
                            finish_reason = Some(reason);
                        }
                    }

                    if let Some(stream_usage) = chunk.usage {
                        usage.input = stream_usage.prompt_tokens;
                        usage.output = stream_usage.completion_tokens;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    let err = Error::api(status.as_u16(), body);
                    yield MessageEvent::Error {
                        message: err.to_string(),
                        retryable: err.is_retryable(),
                    };
                    event_source.close();
                    return;
                }
                Err(e) => {
                    yield MessageEvent::Error {
                        message: format!("SSE error: {}", e),
                        retryable: matches!(e, reqwest_eventsource::Error::Transport(_)),
                    };
                    event_source.close();
                    return;
                }
            }
        }
        event_source.close();

        let mut message = reply.build();
        let stop_reason = match finish_reason.as_deref() {
            Some("length") => StopReason::Length,
            Some("tool_calls") => StopReason::ToolUse,
            _ if message.content().iter().any(Content::is_tool_call) => StopReason::ToolUse,
            _ => StopReason::Stop,
        };
        if let Message::Assistant { metadata, .. } = &mut message {
            metadata.model = Some(model_id);
            metadata.usage = usage.clone();
            metadata.stop_reason = Some(stop_reason);
        }

        yield MessageEvent::Done {
            message,
            stop_reason,
            usage,
        };
    }
}

// Request types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
