//! Folding stream units into a duplicate-free transcript
//!
//! Whole messages are appended once; re-deliveries are recognised by a
//! content key. Token units build an in-progress AI entry that is replaced
//! by the whole message carrying the same id, or finalized when the stream
//! ends. Tool results fill the open call slots of the AI message that
//! requested them.

use parley_schema::{ChatMessage, MessageType, StreamUnit, TaskData, ToolCall};
use std::collections::HashSet;

/// A tool call together with its result, once it has arrived
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSlot {
    pub call: ToolCall,
    pub result: Option<ChatMessage>,
}

/// One rendered block of the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Human(ChatMessage),
    Ai {
        message: ChatMessage,
        tools: Vec<ToolSlot>,
    },
    /// AI text still arriving as tokens
    Streaming {
        message_id: Option<String>,
        text: String,
    },
    /// A tool result outside any call slot: sub-agent output, or a result
    /// whose call id matched nothing (`unmatched`)
    Tool {
        message: ChatMessage,
        unmatched: bool,
    },
    Task {
        message: ChatMessage,
        task: TaskData,
    },
    /// Inline problem report: error units and unexpected shapes
    Warning(String),
    /// Client-side note such as a command's answer
    Notice(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Ai {
        run_id: Option<String>,
        content: String,
        tool_call_ids: Vec<String>,
    },
    Tool {
        tool_call_id: Option<String>,
        content: String,
    },
    Custom(String),
}

impl DedupKey {
    fn of(message: &ChatMessage) -> Option<Self> {
        match message.kind {
            MessageType::Ai => Some(DedupKey::Ai {
                run_id: message.run_id.clone(),
                content: message.content.clone(),
                tool_call_ids: message.tool_calls.iter().map(|c| c.id.clone()).collect(),
            }),
            MessageType::Tool => Some(DedupKey::Tool {
                tool_call_id: message.tool_call_id.clone(),
                content: message.content.clone(),
            }),
            MessageType::Custom => Some(DedupKey::Custom(
                serde_json::to_string(&message.custom_data).unwrap_or_default(),
            )),
            MessageType::Human => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    seen: HashSet<DedupKey>,
    /// `(entry, slot)` of tool calls still waiting for a result, in call order
    open_slots: Vec<(usize, usize)>,
    /// Index of the `Streaming` entry, if one is open
    scratch: Option<usize>,
    /// First entry of the current turn
    turn_start: usize,
    /// Run id carried by the current turn's latest message
    turn_run_id: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a thread's history
    pub fn from_history(messages: Vec<ChatMessage>) -> Self {
        let mut transcript = Self::new();
        for message in messages {
            transcript.apply_message(message);
        }
        transcript
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Add the user's own message at submission time
    pub fn push_human(&mut self, text: impl Into<String>) {
        self.start_turn(ChatMessage::human(text));
    }

    fn start_turn(&mut self, message: ChatMessage) {
        self.finish_scratch();
        self.turn_start = self.entries.len();
        self.turn_run_id = None;
        self.entries.push(Entry::Human(message));
    }

    pub fn push_warning(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Warning(text.into()));
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Notice(text.into()));
    }

    /// Every message in the transcript, tool results after their call
    pub fn messages(&self) -> Vec<&ChatMessage> {
        let mut out = vec![];
        for entry in &self.entries {
            match entry {
                Entry::Human(message) | Entry::Tool { message, .. } | Entry::Task { message, .. } => {
                    out.push(message)
                }
                Entry::Ai { message, tools } => {
                    out.push(message);
                    out.extend(tools.iter().filter_map(|slot| slot.result.as_ref()));
                }
                Entry::Streaming { .. } | Entry::Warning(_) | Entry::Notice(_) => {}
            }
        }
        out
    }

    /// Run id of the latest AI message, the target of feedback
    pub fn last_run_id(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|entry| match entry {
            Entry::Ai { message, .. } => message.run_id.as_deref(),
            _ => None,
        })
    }

    /// Tool calls still waiting for their result
    pub fn open_tool_calls(&self) -> usize {
        self.open_slots.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.scratch.is_some()
    }

    /// Fold one unit from the stream
    pub fn apply(&mut self, unit: StreamUnit) {
        match unit {
            StreamUnit::Token {
                content,
                message_id,
            } => self.apply_token(content, message_id),
            StreamUnit::Message { content } => self.apply_message(content),
            StreamUnit::Error { content } => {
                self.finish_scratch();
                self.push_warning(content);
            }
            StreamUnit::Done => self.finish(),
        }
    }

    /// Close the turn: finalize any in-progress text
    pub fn finish(&mut self) {
        self.finish_scratch();
        if !self.open_slots.is_empty() {
            tracing::debug!(open = self.open_slots.len(), "turn ended with open tool calls");
        }
    }

    fn apply_token(&mut self, text: String, message_id: Option<String>) {
        if let Some(index) = self.scratch {
            if let Entry::Streaming {
                message_id: open_id,
                text: buffer,
            } = &mut self.entries[index]
            {
                if message_id.is_none() || open_id.is_none() || *open_id == message_id {
                    buffer.push_str(&text);
                    return;
                }
            }
            self.finish_scratch();
        }
        self.scratch = Some(self.entries.len());
        self.entries.push(Entry::Streaming { message_id, text });
    }

    /// Turn the scratch buffer into a whole AI message unless one is present.
    /// Without a run id for the turn the text is kept as is, since the key
    /// could not tell it apart from the same words in another turn.
    fn finish_scratch(&mut self) {
        let Some(index) = self.scratch.take() else {
            return;
        };
        let Entry::Streaming { message_id, text } = self.entries.remove(index) else {
            return;
        };
        self.reindex_after_remove(index);
        if text.is_empty() {
            return;
        }
        let mut message = ChatMessage::ai(text);
        message.id = message_id;
        message.run_id = self.turn_run_id.clone();
        if message.run_id.is_some() {
            self.push_ai(message);
        } else {
            self.append_ai(message);
        }
    }

    fn apply_message(&mut self, message: ChatMessage) {
        if message.run_id.is_some() && message.kind != MessageType::Human {
            self.turn_run_id = message.run_id.clone();
        }
        match message.kind {
            MessageType::Human => self.start_turn(message),
            MessageType::Ai => {
                self.replace_or_finish_scratch(&message);
                self.push_ai(message);
            }
            MessageType::Tool => self.push_tool(message),
            MessageType::Custom => self.push_custom(message),
        }
    }

    /// Drop the scratch buffer the whole `message` supersedes; any other
    /// open buffer is finalized first.
    fn replace_or_finish_scratch(&mut self, message: &ChatMessage) {
        let Some(index) = self.scratch else {
            return;
        };
        let supersedes = match &self.entries[index] {
            Entry::Streaming { message_id, .. } => {
                message_id.is_none() || message.id.is_none() || *message_id == message.id
            }
            _ => false,
        };
        if supersedes {
            self.scratch = None;
            self.entries.remove(index);
            self.reindex_after_remove(index);
        } else {
            self.finish_scratch();
        }
    }

    fn reindex_after_remove(&mut self, removed: usize) {
        for (entry, _) in &mut self.open_slots {
            if *entry > removed {
                *entry -= 1;
            }
        }
        if let Some(scratch) = &mut self.scratch {
            if *scratch > removed {
                *scratch -= 1;
            }
        }
        if self.turn_start > removed {
            self.turn_start -= 1;
        }
    }

    fn insert_key(&mut self, message: &ChatMessage) -> bool {
        match DedupKey::of(message) {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    fn push_ai(&mut self, message: ChatMessage) {
        if self.insert_key(&message) {
            self.append_ai(message);
        }
    }

    fn append_ai(&mut self, message: ChatMessage) {
        let index = self.entries.len();
        let tools: Vec<ToolSlot> = message
            .tool_calls
            .iter()
            .map(|call| ToolSlot {
                call: call.clone(),
                result: None,
            })
            .collect();
        self.open_slots.extend((0..tools.len()).map(|slot| (index, slot)));
        self.entries.push(Entry::Ai { message, tools });
    }

    fn push_tool(&mut self, message: ChatMessage) {
        self.finish_scratch();
        if !self.insert_key(&message) {
            return;
        }

        let exact = message.tool_call_id().and_then(|id| {
            self.open_slots
                .iter()
                .position(|&(entry, slot)| self.slot_call_id(entry, slot) == Some(id))
        });
        // Results without a usable id only pair with calls of this turn
        let synthetic = message.tool_call_id().is_none() || message.has_synthetic_tool_call_id();
        let position = match exact {
            Some(position) => Some(position),
            None if synthetic => self.open_slots.iter().position(|&(entry, _)| entry >= self.turn_start),
            None => None,
        };

        if let Some(position) = position {
            let (entry, slot) = self.open_slots.remove(position);
            if let Entry::Ai { tools, .. } = &mut self.entries[entry] {
                tools[slot].result = Some(message);
            }
            return;
        }

        if synthetic {
            self.entries.push(Entry::Tool {
                message,
                unmatched: false,
            });
        } else {
            tracing::warn!(tool_call_id = ?message.tool_call_id, "tool result matches no open call");
            self.entries.push(Entry::Warning(format!(
                "Tool result for unknown call {}",
                message.tool_call_id().unwrap_or_default()
            )));
            self.entries.push(Entry::Tool {
                message,
                unmatched: true,
            });
        }
    }

    fn slot_call_id(&self, entry: usize, slot: usize) -> Option<&str> {
        match &self.entries[entry] {
            Entry::Ai { tools, .. } => tools.get(slot).map(|s| s.call.id.as_str()),
            _ => None,
        }
    }

    fn push_custom(&mut self, message: ChatMessage) {
        self.finish_scratch();
        if !self.insert_key(&message) {
            return;
        }
        let Some(task) = TaskData::from_message(&message) else {
            self.push_warning(format!(
                "Unexpected custom message: {}",
                serde_json::Value::Object(message.custom_data)
            ));
            return;
        };

        // Later states of the same task replace the earlier one
        let existing = self.entries.iter_mut().rev().find_map(|entry| match entry {
            Entry::Task { task: t, message: m } if t.run_id == task.run_id && t.name == task.name => {
                Some((t, m))
            }
            _ => None,
        });
        match existing {
            Some((t, m)) => {
                *t = task;
                *m = message;
            }
            None => self.entries.push(Entry::Task { message, task }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_schema::{SYNTHETIC_TOOL_ID_PREFIX, TaskState};

    fn ai_with_calls(content: &str, ids: &[&str]) -> ChatMessage {
        ChatMessage::ai(content).with_run_id("r1").with_tool_calls(
            ids.iter()
                .map(|id| ToolCall {
                    id: id.to_string(),
                    name: "calculator".into(),
                    args: serde_json::json!({"expression": "2+2"}),
                })
                .collect(),
        )
    }

    fn fold(transcript: &mut Transcript, units: Vec<StreamUnit>) {
        for unit in units {
            transcript.apply(unit);
        }
    }

    fn ai_contents(transcript: &Transcript) -> Vec<String> {
        transcript
            .messages()
            .into_iter()
            .filter(|m| m.is_ai())
            .map(|m| m.content.clone())
            .collect()
    }

    // --- whole messages ---

    #[test]
    fn test_single_answer_without_tokens() {
        let mut transcript = Transcript::new();
        transcript.push_human("2+2?");
        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ChatMessage::ai("4").with_run_id("r1")),
                StreamUnit::Done,
            ],
        );

        let kinds: Vec<MessageType> = transcript.messages().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageType::Human, MessageType::Ai]);
        assert_eq!(transcript.last_run_id(), Some("r1"));
    }

    #[test]
    fn test_redelivery_is_noop() {
        let mut transcript = Transcript::new();
        let answer = ChatMessage::ai("4").with_run_id("r1");
        let tool = ChatMessage::tool("4", "call_1");
        let mut data = serde_json::Map::new();
        data.insert("name".into(), "search".into());
        data.insert("run_id".into(), "r1".into());
        let custom = ChatMessage::custom(data);

        for _ in 0..2 {
            fold(
                &mut transcript,
                vec![
                    StreamUnit::message(answer.clone()),
                    StreamUnit::message(tool.clone()),
                    StreamUnit::message(custom.clone()),
                ],
            );
        }
        assert_eq!(transcript.messages().len(), 3);
    }

    #[test]
    fn test_same_answer_in_later_run_is_kept() {
        let mut transcript = Transcript::new();
        transcript.apply(StreamUnit::message(ChatMessage::ai("4").with_run_id("r1")));
        transcript.apply(StreamUnit::message(ChatMessage::ai("4").with_run_id("r2")));
        assert_eq!(ai_contents(&transcript), vec!["4", "4"]);
    }

    // --- tokens ---

    #[test]
    fn test_tokens_replaced_by_whole_message() {
        let mut transcript = Transcript::new();
        transcript.push_human("2+2?");
        fold(
            &mut transcript,
            vec![StreamUnit::token("4", Some("run-a".into()))],
        );
        assert!(transcript.is_streaming());
        assert!(matches!(&transcript.entries()[1], Entry::Streaming { text, .. } if text == "4"));

        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ChatMessage::ai("4").with_id("run-a").with_run_id("r1")),
                StreamUnit::Done,
            ],
        );
        assert!(!transcript.is_streaming());
        assert_eq!(ai_contents(&transcript), vec!["4"]);
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn test_tokens_finalized_at_done() {
        let mut transcript = Transcript::new();
        fold(
            &mut transcript,
            vec![
                StreamUnit::token("Hel", Some("run-a".into())),
                StreamUnit::token("lo", Some("run-a".into())),
                StreamUnit::Done,
            ],
        );
        assert_eq!(ai_contents(&transcript), vec!["Hello"]);
        assert!(!transcript.is_streaming());
    }

    #[test]
    fn test_tokens_for_new_message_close_previous_buffer() {
        let mut transcript = Transcript::new();
        fold(
            &mut transcript,
            vec![
                StreamUnit::token("Let me check.", Some("run-a".into())),
                StreamUnit::token("It is 4.", Some("run-b".into())),
                StreamUnit::message(ChatMessage::ai("It is 4.").with_id("run-b")),
                StreamUnit::Done,
            ],
        );
        assert_eq!(ai_contents(&transcript), vec!["Let me check.", "It is 4."]);
    }

    #[test]
    fn test_same_streamed_text_in_two_turns() {
        let mut transcript = Transcript::new();
        for _ in 0..2 {
            transcript.push_human("2+2?");
            fold(
                &mut transcript,
                vec![StreamUnit::token("4", None), StreamUnit::error("stream cut")],
            );
        }
        assert_eq!(ai_contents(&transcript), vec!["4", "4"]);
    }

    #[test]
    fn test_streamed_text_takes_run_id_of_turn() {
        let mut transcript = Transcript::new();
        transcript.push_human("2+2?");
        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ai_with_calls("", &["call_1"])),
                StreamUnit::message(ChatMessage::tool("4", "call_1")),
                StreamUnit::token("It is 4", Some("m2".into())),
                StreamUnit::Done,
            ],
        );
        assert_eq!(ai_contents(&transcript), vec!["", "It is 4"]);
        match transcript.entries().last() {
            Some(Entry::Ai { message, .. }) => assert_eq!(message.run_id.as_deref(), Some("r1")),
            other => panic!("expected ai entry, got {:?}", other),
        }
    }

    // --- tool calls ---

    #[test]
    fn test_tool_results_fill_slots_in_order() {
        let mut transcript = Transcript::new();
        transcript.apply(StreamUnit::message(ai_with_calls("", &["call_1", "call_2"])));
        assert_eq!(transcript.open_tool_calls(), 2);

        transcript.apply(StreamUnit::message(ChatMessage::tool("b", "call_2")));
        transcript.apply(StreamUnit::message(ChatMessage::tool("a", "call_1")));
        assert_eq!(transcript.open_tool_calls(), 0);

        match &transcript.entries()[0] {
            Entry::Ai { tools, .. } => {
                assert_eq!(tools[0].result.as_ref().unwrap().content, "a");
                assert_eq!(tools[1].result.as_ref().unwrap().content, "b");
            }
            other => panic!("expected ai entry, got {:?}", other),
        }
    }

    #[test]
    fn test_synthetic_id_takes_first_open_slot() {
        let mut transcript = Transcript::new();
        let synthetic = format!("{}1234", SYNTHETIC_TOOL_ID_PREFIX);
        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ai_with_calls("", &["call_1"])),
                StreamUnit::message(ChatMessage::tool("4", synthetic)),
                StreamUnit::message(ChatMessage::ai("4").with_run_id("r1")),
                StreamUnit::Done,
            ],
        );
        assert_eq!(transcript.open_tool_calls(), 0);
        assert!(!transcript.entries().iter().any(|e| matches!(e, Entry::Warning(_))));
        match &transcript.entries()[0] {
            Entry::Ai { tools, .. } => assert_eq!(tools[0].result.as_ref().unwrap().content, "4"),
            other => panic!("expected ai entry, got {:?}", other),
        }
    }

    #[test]
    fn test_synthetic_id_ignores_calls_of_earlier_turns() {
        let mut transcript = Transcript::new();
        transcript.push_human("2+2?");
        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ai_with_calls("", &["c1"])),
                StreamUnit::error("tool crashed"),
                StreamUnit::Done,
            ],
        );
        transcript.push_human("turn2");
        let synthetic = format!("{}5678", SYNTHETIC_TOOL_ID_PREFIX);
        transcript.apply(StreamUnit::message(ChatMessage::tool("notes", synthetic)));

        assert_eq!(transcript.open_tool_calls(), 1);
        assert!(matches!(transcript.entries().last(), Some(Entry::Tool { unmatched: false, .. })));

        // The exact id still reaches back
        transcript.apply(StreamUnit::message(ChatMessage::tool("4", "c1")));
        assert_eq!(transcript.open_tool_calls(), 0);
    }

    #[test]
    fn test_unmatched_result_is_flagged() {
        let mut transcript = Transcript::new();
        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ai_with_calls("", &["call_1"])),
                StreamUnit::message(ChatMessage::tool("??", "call_9")),
            ],
        );
        assert_eq!(transcript.open_tool_calls(), 1);
        assert!(matches!(&transcript.entries()[1], Entry::Warning(w) if w.contains("call_9")));
        assert!(matches!(&transcript.entries()[2], Entry::Tool { unmatched: true, .. }));
    }

    #[test]
    fn test_subagent_output_without_open_call() {
        let mut transcript = Transcript::new();
        let message =
            ChatMessage::tool("findings", format!("{}abc", SYNTHETIC_TOOL_ID_PREFIX)).with_name("research_expert");
        transcript.apply(StreamUnit::message(message));
        assert!(matches!(
            &transcript.entries()[0],
            Entry::Tool { unmatched: false, message } if message.name.as_deref() == Some("research_expert")
        ));
    }

    // --- custom / errors ---

    #[test]
    fn test_task_updates_in_place() {
        let mut transcript = Transcript::new();
        let mut task = TaskData::new("search", "r1");
        let started = ChatMessage::custom(task.to_payload().as_object().cloned().unwrap());
        task.state = TaskState::Complete;
        let done = ChatMessage::custom(task.to_payload().as_object().cloned().unwrap());

        transcript.apply(StreamUnit::message(started));
        transcript.apply(StreamUnit::message(done));
        assert_eq!(transcript.entries().len(), 1);
        assert!(matches!(&transcript.entries()[0], Entry::Task { task, .. } if task.completed()));
    }

    #[test]
    fn test_bad_custom_and_error_units_become_warnings() {
        let mut transcript = Transcript::new();
        let mut data = serde_json::Map::new();
        data.insert("state".into(), "exploded".into());
        fold(
            &mut transcript,
            vec![
                StreamUnit::message(ChatMessage::custom(data)),
                StreamUnit::error("Unexpected error"),
                StreamUnit::Done,
            ],
        );
        assert!(matches!(&transcript.entries()[0], Entry::Warning(w) if w.starts_with("Unexpected custom message")));
        assert_eq!(transcript.entries()[1], Entry::Warning("Unexpected error".into()));
    }

    #[test]
    fn test_history_rebuild() {
        let transcript = Transcript::from_history(vec![
            ChatMessage::human("2+2?"),
            ai_with_calls("", &["call_1"]),
            ChatMessage::tool("4", "call_1"),
            ChatMessage::ai("4"),
        ]);
        assert_eq!(transcript.messages().len(), 4);
        assert_eq!(transcript.open_tool_calls(), 0);
    }
}
