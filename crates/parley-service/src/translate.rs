//! Graph events to stream units

use futures::StreamExt;
use parley_agent::{GraphEvent, GraphEventStream, Interrupt, SKIP_STREAM_TAG, TokenChunk};
use parley_ai::Message;
use parley_schema::{ChatMessage, MessageType, SYNTHETIC_TOOL_ID_PREFIX, StreamUnit};
use std::collections::HashSet;
use std::pin::Pin;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::{config::TranslatorConfig, convert::to_chat_message};

/// Text of every error unit; details stay in the server log
pub const GENERIC_ERROR: &str = "Unexpected error";

pub type UnitStream = Pin<Box<dyn Stream<Item = StreamUnit> + Send>>;

/// Flattens one turn's graph events into stream units.
///
/// Whole AI messages are always forwarded because they carry the run id and
/// tool calls. Their ids are remembered so that late tokens for an already
/// delivered message are dropped; the client replaces its in-progress
/// buffer when the whole message with the same id arrives.
pub struct EventTranslator {
    config: TranslatorConfig,
    run_id: String,
    input_text: String,
    stream_tokens: bool,
    delivered_ids: HashSet<String>,
    interrupted: bool,
}

impl EventTranslator {
    pub fn new(
        config: TranslatorConfig,
        run_id: impl Into<String>,
        input_text: impl Into<String>,
        stream_tokens: bool,
    ) -> Self {
        Self {
            config,
            run_id: run_id.into(),
            input_text: input_text.into(),
            stream_tokens,
            delivered_ids: HashSet::new(),
            interrupted: false,
        }
    }

    /// Whether an interrupt was seen; later turns on the thread must resume
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Once the run is suspended only further interrupts are forwarded;
    /// anything else belongs to the resumed run, not this turn.
    pub fn translate(&mut self, event: GraphEvent) -> Vec<StreamUnit> {
        if self.is_interrupted() && !matches!(event, GraphEvent::Interrupt { .. }) {
            tracing::debug!(run_id = %self.run_id, "Dropping event after interrupt");
            return vec![];
        }
        match event {
            GraphEvent::Update { node, messages } => self.translate_update(&node, messages),
            GraphEvent::Interrupt { interrupts } => self.translate_interrupts(&interrupts),
            GraphEvent::Token { chunk } => self.translate_token(chunk).into_iter().collect(),
            GraphEvent::Custom { payload } => vec![self.translate_custom(payload)],
            GraphEvent::Values { .. } => vec![],
        }
    }

    fn translate_update(&mut self, node: &str, messages: Vec<Message>) -> Vec<StreamUnit> {
        let mut chats: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();

        if self.config.supervisor_nodes.iter().any(|n| n == node) {
            chats = chats.into_iter().filter(|m| m.is_ai()).last().into_iter().collect();
        }
        if self.config.subagent_nodes.iter().any(|n| n == node) {
            chats = chats
                .into_iter()
                .map(|m| ChatMessage::tool(m.content, "").with_name(node))
                .collect();
        }

        chats
            .into_iter()
            .filter_map(|chat| self.finish_message(chat))
            .map(StreamUnit::message)
            .collect()
    }

    fn finish_message(&mut self, mut chat: ChatMessage) -> Option<ChatMessage> {
        if chat.kind == MessageType::Human && chat.content == self.input_text {
            return None;
        }
        if chat.kind == MessageType::Tool && chat.tool_call_id().is_none() {
            let id = format!("{}{}", SYNTHETIC_TOOL_ID_PREFIX, Uuid::new_v4());
            tracing::warn!("Found empty tool_call_id, assigned temporary ID: {}", id);
            chat.tool_call_id = Some(id);
        }
        if let (true, Some(id)) = (chat.is_ai(), &chat.id) {
            self.delivered_ids.insert(id.clone());
        }
        chat.run_id = Some(self.run_id.clone());
        Some(chat)
    }

    fn translate_interrupts(&mut self, interrupts: &[Interrupt]) -> Vec<StreamUnit> {
        self.interrupted = true;
        interrupts
            .iter()
            .map(|i| StreamUnit::message(ChatMessage::ai(i.value_text()).with_run_id(&self.run_id)))
            .collect()
    }

    fn translate_token(&self, chunk: TokenChunk) -> Option<StreamUnit> {
        if !self.stream_tokens
            || chunk.has_tag(SKIP_STREAM_TAG)
            || self.delivered_ids.contains(&chunk.message_id)
            || chunk.text.is_empty()
        {
            return None;
        }
        Some(StreamUnit::token(chunk.text, Some(chunk.message_id)))
    }

    fn translate_custom(&self, payload: serde_json::Value) -> StreamUnit {
        match payload {
            serde_json::Value::Object(data) => {
                StreamUnit::message(ChatMessage::custom(data).with_run_id(&self.run_id))
            }
            other => {
                tracing::error!("Error parsing message: custom payload is not an object: {}", other);
                StreamUnit::error(GENERIC_ERROR)
            }
        }
    }
}

/// Drive a graph stream through the translator and close with `[DONE]`.
///
/// An execution error is logged, reported as one error unit and ends the turn.
pub fn translate_stream(mut events: GraphEventStream, mut translator: EventTranslator) -> UnitStream {
    Box::pin(async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    for unit in translator.translate(event) {
                        yield unit;
                    }
                }
                Err(e) => {
                    tracing::error!("Error in message generator: {}", e);
                    yield StreamUnit::error(GENERIC_ERROR);
                    break;
                }
            }
        }
        yield StreamUnit::Done;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_agent::testing::{ScriptedGraph, Step};
    use parley_agent::{AgentGraph, GraphInput, RunConfig, START_NODE};
    use parley_ai::Content;

    fn translator(stream_tokens: bool) -> EventTranslator {
        EventTranslator::new(TranslatorConfig::default(), "run-1", "2+2?", stream_tokens)
    }

    fn token(message_id: &str, text: &str, tags: &[&str]) -> GraphEvent {
        GraphEvent::Token {
            chunk: TokenChunk {
                message_id: message_id.into(),
                node: "agent".into(),
                text: text.into(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        }
    }

    fn answer(text: &str, id: &str) -> GraphEvent {
        GraphEvent::update("agent", vec![Message::assistant(text).with_id(id)])
    }

    fn as_message(unit: &StreamUnit) -> &ChatMessage {
        match unit {
            StreamUnit::Message { content } => content,
            other => panic!("expected message unit, got {:?}", other),
        }
    }

    async fn run_script(steps: Vec<Step>, stream_tokens: bool) -> Vec<StreamUnit> {
        let graph = ScriptedGraph::new("scripted", steps);
        let events = graph.stream(GraphInput::Messages(vec![]), RunConfig::new("t1", "run-1"));
        translate_stream(events, translator(stream_tokens)).collect().await
    }

    // --- updates ---

    #[test]
    fn test_input_echo_is_dropped() {
        let mut t = translator(false);
        let units = t.translate(GraphEvent::update(START_NODE, vec![Message::user("2+2?")]));
        assert!(units.is_empty());

        let units = t.translate(GraphEvent::update(START_NODE, vec![Message::user("other")]));
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn test_messages_get_run_id() {
        let mut t = translator(false);
        let units = t.translate(answer("4", "m1"));
        let msg = as_message(&units[0]);
        assert_eq!(msg.content, "4");
        assert_eq!(msg.run_id.as_deref(), Some("run-1"));
        assert_eq!(msg.id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_empty_tool_call_id_gets_synthetic_id() {
        let mut t = translator(false);
        let units = t.translate(GraphEvent::update(
            "tools",
            vec![Message::tool_result("", "add", vec![Content::text("4")], false)],
        ));
        let id = as_message(&units[0]).tool_call_id.clone().unwrap();
        assert!(id.starts_with(SYNTHETIC_TOOL_ID_PREFIX));
        assert!(id.len() > SYNTHETIC_TOOL_ID_PREFIX.len());
    }

    #[test]
    fn test_subagent_output_becomes_tool_message() {
        let mut t = translator(false);
        let units = t.translate(GraphEvent::update(
            "research_expert",
            vec![Message::assistant("Paris is the capital")],
        ));
        let msg = as_message(&units[0]);
        assert_eq!(msg.kind, MessageType::Tool);
        assert_eq!(msg.name.as_deref(), Some("research_expert"));
        assert!(msg.tool_call_id().unwrap().starts_with(SYNTHETIC_TOOL_ID_PREFIX));
    }

    #[test]
    fn test_supervisor_keeps_last_ai_message() {
        let mut t = translator(false);
        let units = t.translate(GraphEvent::update(
            "supervisor",
            vec![
                Message::user("hello"),
                Message::assistant("first"),
                Message::assistant("second"),
            ],
        ));
        assert_eq!(units.len(), 1);
        assert_eq!(as_message(&units[0]).content, "second");
    }

    #[test]
    fn test_interrupt_becomes_ai_message() {
        let mut t = translator(true);
        let units = t.translate(GraphEvent::Interrupt {
            interrupts: vec![Interrupt {
                id: "i1".into(),
                value: serde_json::json!("Which city?"),
            }],
        });
        assert!(t.is_interrupted());
        let msg = as_message(&units[0]);
        assert!(msg.is_ai());
        assert_eq!(msg.content, "Which city?");
    }

    #[tokio::test]
    async fn test_nothing_follows_interrupt_in_turn() {
        let units = run_script(
            vec![
                Step::Emit(GraphEvent::Interrupt {
                    interrupts: vec![Interrupt {
                        id: "i1".into(),
                        value: serde_json::json!("Which city?"),
                    }],
                }),
                Step::Emit(token("m9", "Paris", &[])),
                Step::Emit(answer("Paris it is", "m9")),
            ],
            true,
        )
        .await;
        assert_eq!(units.len(), 2);
        assert_eq!(as_message(&units[0]).content, "Which city?");
        assert!(units[1].is_done());
    }

    // --- tokens ---

    #[test]
    fn test_tokens_dropped_when_not_requested() {
        let mut t = translator(false);
        assert!(t.translate(token("m1", "4", &[])).is_empty());
    }

    #[test]
    fn test_tokens_carry_message_id() {
        let mut t = translator(true);
        let units = t.translate(token("m1", "4", &[]));
        assert_eq!(units, vec![StreamUnit::token("4", Some("m1".into()))]);
    }

    #[test]
    fn test_skip_stream_tag_and_empty_text_suppressed() {
        let mut t = translator(true);
        assert!(t.translate(token("m1", "4", &[SKIP_STREAM_TAG])).is_empty());
        assert!(t.translate(token("m1", "", &[])).is_empty());
    }

    #[test]
    fn test_tokens_after_whole_delivery_suppressed() {
        let mut t = translator(true);
        t.translate(answer("4", "m1"));
        assert!(t.translate(token("m1", "4", &[])).is_empty());
        assert_eq!(t.translate(token("m2", "5", &[])).len(), 1);
    }

    // --- custom ---

    #[test]
    fn test_custom_object_forwarded() {
        let mut t = translator(false);
        let units = t.translate(GraphEvent::Custom {
            payload: serde_json::json!({"name": "search", "state": "new"}),
        });
        let msg = as_message(&units[0]);
        assert_eq!(msg.kind, MessageType::Custom);
        assert_eq!(msg.custom_data["name"], "search");
    }

    #[test]
    fn test_custom_non_object_is_error_unit() {
        let mut t = translator(false);
        let units = t.translate(GraphEvent::Custom {
            payload: serde_json::json!([1, 2]),
        });
        assert_eq!(units, vec![StreamUnit::error(GENERIC_ERROR)]);
    }

    // --- whole streams ---

    #[tokio::test]
    async fn test_stream_without_tokens_yields_one_ai_message() {
        let units = run_script(
            vec![
                Step::Emit(GraphEvent::update(START_NODE, vec![Message::user("2+2?")])),
                Step::Emit(token("m1", "4", &[])),
                Step::Emit(answer("4", "m1")),
                Step::Emit(GraphEvent::Values { messages: vec![] }),
            ],
            false,
        )
        .await;

        assert_eq!(units.len(), 2);
        assert_eq!(as_message(&units[0]).content, "4");
        assert!(units[1].is_done());
    }

    #[tokio::test]
    async fn test_stream_with_tokens_shares_message_id() {
        let units = run_script(
            vec![
                Step::Emit(token("m1", "4", &[])),
                Step::Emit(answer("4", "m1")),
            ],
            true,
        )
        .await;

        assert_eq!(units[0], StreamUnit::token("4", Some("m1".into())));
        assert_eq!(as_message(&units[1]).id.as_deref(), Some("m1"));
        assert!(units[2].is_done());
    }

    #[tokio::test]
    async fn test_bad_custom_event_does_not_end_stream() {
        let units = run_script(
            vec![
                Step::Emit(GraphEvent::Custom {
                    payload: serde_json::json!("oops"),
                }),
                Step::Emit(answer("still here", "m1")),
            ],
            false,
        )
        .await;

        assert_eq!(units[0], StreamUnit::error(GENERIC_ERROR));
        assert_eq!(as_message(&units[1]).content, "still here");
        assert!(units[2].is_done());
    }

    #[tokio::test]
    async fn test_execution_error_ends_stream() {
        let units = run_script(
            vec![
                Step::Emit(answer("partial", "m1")),
                Step::Fail("api key sk-123 rejected".into()),
                Step::Emit(answer("never", "m2")),
            ],
            false,
        )
        .await;

        assert_eq!(units.len(), 3);
        assert_eq!(units[1], StreamUnit::error(GENERIC_ERROR));
        assert!(units[2].is_done());
    }
}
