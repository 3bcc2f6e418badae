//! Turn dispatch: select the graph, decide between a new message and a
//! resume, then run it

use parley_agent::{AgentGraph, GraphInput, InvokeOutcome, RunConfig};
use parley_ai::Message;
use parley_schema::{ChatMessage, UserInput};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::TranslatorConfig,
    convert::to_chat_message,
    error::ApiError,
    registry::AgentRegistry,
    translate::{EventTranslator, UnitStream, translate_stream},
};

/// A turn ready to run against its graph
pub struct Turn {
    pub graph: Arc<dyn AgentGraph>,
    pub input: GraphInput,
    pub config: RunConfig,
    /// The user text that started the turn, used to drop its echo
    pub message: String,
}

impl Turn {
    pub fn run_id(&self) -> &str {
        &self.config.run_id
    }

    pub fn is_resume(&self) -> bool {
        matches!(self.input, GraphInput::Resume(_))
    }
}

/// Validate `input`, pick the graph and build the graph input.
///
/// A thread that is suspended on an interrupt always receives the message as
/// its resume value.
pub async fn prepare_turn(
    registry: &AgentRegistry,
    agent_id: &str,
    input: &UserInput,
) -> Result<Turn, ApiError> {
    let collisions = input.reserved_key_collisions();
    if !collisions.is_empty() {
        return Err(ApiError::Unprocessable(format!(
            "agent_config contains reserved keys: {:?}",
            collisions
        )));
    }

    let graph = registry.get(agent_id, input.model.as_deref()).await?;

    let run_id = Uuid::new_v4().to_string();
    let thread_id = input
        .thread_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut config = RunConfig::new(&thread_id, &run_id);
    config.model = input.model.clone();
    config
        .configurable
        .insert("thread_id".into(), thread_id.clone().into());
    if let Some(model) = &input.model {
        config.configurable.insert("model".into(), model.clone().into());
    }
    if let Some(extra) = &input.agent_config {
        config
            .configurable
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let state = graph.get_state(&thread_id).await?;
    let graph_input = if state.is_interrupted() {
        tracing::debug!(%thread_id, "Thread is interrupted, resuming");
        GraphInput::Resume(serde_json::Value::String(input.message.clone()))
    } else {
        GraphInput::Messages(vec![Message::user(&input.message)])
    };
    tracing::debug!(agent = graph.name(), %thread_id, %run_id, "Dispatching turn");

    Ok(Turn {
        graph,
        input: graph_input,
        config,
        message: input.message.clone(),
    })
}

/// Run the turn to the end and return its final message.
///
/// A run that stops on an interrupt answers with the interrupt value as an
/// AI message.
pub async fn invoke_turn(turn: Turn) -> Result<ChatMessage, ApiError> {
    let run_id = turn.config.run_id.clone();
    let outcome = turn.graph.invoke(turn.input, turn.config).await?;
    let message = match outcome {
        InvokeOutcome::Completed(messages) => messages
            .last()
            .map(to_chat_message)
            .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Run {} produced no messages", run_id)))?,
        InvokeOutcome::Interrupted(interrupts) => {
            let value = interrupts.first().map(|i| i.value_text()).unwrap_or_default();
            ChatMessage::ai(value)
        }
    };
    Ok(message.with_run_id(run_id))
}

/// Start the turn and translate its events into stream units
pub fn stream_turn(turn: Turn, translator: TranslatorConfig, stream_tokens: bool) -> UnitStream {
    let translator = EventTranslator::new(translator, turn.config.run_id.clone(), turn.message, stream_tokens);
    let events = turn.graph.stream(turn.input, turn.config);
    translate_stream(events, translator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::registry::GraphBuilder;
    use parley_agent::testing::ScriptedGraph;
    use parley_agent::{GraphEvent, Interrupt, MemoryCheckpointer, StateSnapshot};
    use std::collections::HashMap;

    fn registry_with(graph: Arc<ScriptedGraph>) -> AgentRegistry {
        let builder: GraphBuilder = Box::new(move |_, _, _, _| Ok(graph.clone() as Arc<dyn AgentGraph>));
        AgentRegistry::new(
            Arc::new(ServiceConfig::default()),
            Arc::new(MemoryCheckpointer::new()),
            HashMap::new(),
            builder,
        )
    }

    fn interrupted() -> StateSnapshot {
        StateSnapshot {
            messages: vec![],
            interrupts: vec![Interrupt {
                id: "int-1".into(),
                value: "Which city?".into(),
            }],
        }
    }

    // --- prepare ---

    #[tokio::test]
    async fn test_new_thread_gets_generated_id() {
        let registry = registry_with(Arc::new(ScriptedGraph::emitting("g", vec![])));
        let mut input = UserInput::new("2+2?");
        input.thread_id = Some(String::new());

        let turn = prepare_turn(&registry, "research-assistant", &input).await.unwrap();
        assert!(!turn.config.thread_id.is_empty());
        assert_eq!(
            turn.config.configurable.get("thread_id"),
            Some(&serde_json::Value::String(turn.config.thread_id.clone()))
        );
        assert!(!turn.is_resume());
    }

    #[tokio::test]
    async fn test_agent_config_merged_into_configurable() {
        let registry = registry_with(Arc::new(ScriptedGraph::emitting("g", vec![])));
        let mut input = UserInput::new("hi");
        input.thread_id = Some("t1".into());
        input.model = Some("ollama".into());
        let mut extra = serde_json::Map::new();
        extra.insert("temperature".into(), 0.2.into());
        input.agent_config = Some(extra);

        let turn = prepare_turn(&registry, "research-assistant", &input).await.unwrap();
        let keys: Vec<&str> = turn.config.configurable.keys().map(String::as_str).collect();
        assert!(keys.contains(&"thread_id"));
        assert!(keys.contains(&"model"));
        assert!(keys.contains(&"temperature"));
        assert_eq!(turn.config.model.as_deref(), Some("ollama"));
    }

    #[tokio::test]
    async fn test_reserved_keys_rejected() {
        let registry = registry_with(Arc::new(ScriptedGraph::emitting("g", vec![])));
        let mut input = UserInput::new("hi");
        let mut extra = serde_json::Map::new();
        extra.insert("model".into(), "x".into());
        extra.insert("thread_id".into(), "y".into());
        input.agent_config = Some(extra);

        let err = prepare_turn(&registry, "research-assistant", &input)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ApiError::Unprocessable(m) if m == r#"agent_config contains reserved keys: ["model", "thread_id"]"#
        ));
    }

    #[tokio::test]
    async fn test_interrupted_thread_is_resumed() {
        let graph = Arc::new(ScriptedGraph::emitting("g", vec![]).with_state("t1", interrupted()));
        let registry = registry_with(graph);
        let mut input = UserInput::new("Paris");
        input.thread_id = Some("t1".into());

        let turn = prepare_turn(&registry, "research-assistant", &input).await.unwrap();
        assert!(matches!(&turn.input, GraphInput::Resume(serde_json::Value::String(s)) if s == "Paris"));

        input.thread_id = Some("t2".into());
        let turn = prepare_turn(&registry, "research-assistant", &input).await.unwrap();
        assert!(matches!(&turn.input, GraphInput::Messages(m) if m.len() == 1 && m[0].text() == "Paris"));
    }

    // --- invoke ---

    #[tokio::test]
    async fn test_invoke_returns_last_message_with_run_id() {
        let graph = Arc::new(ScriptedGraph::emitting(
            "g",
            vec![GraphEvent::Values {
                messages: vec![Message::user("2+2?"), Message::assistant("4").with_id("run-a")],
            }],
        ));
        let registry = registry_with(graph);
        let turn = prepare_turn(&registry, "research-assistant", &UserInput::new("2+2?"))
            .await
            .unwrap();
        let run_id = turn.run_id().to_string();

        let message = invoke_turn(turn).await.unwrap();
        assert!(message.is_ai());
        assert_eq!(message.content, "4");
        assert_eq!(message.run_id.as_deref(), Some(run_id.as_str()));
    }

    #[tokio::test]
    async fn test_invoke_interrupt_answers_with_value() {
        let graph = Arc::new(ScriptedGraph::emitting(
            "g",
            vec![GraphEvent::Interrupt {
                interrupts: interrupted().interrupts,
            }],
        ));
        let registry = registry_with(graph);
        let turn = prepare_turn(&registry, "research-assistant", &UserInput::new("weather?"))
            .await
            .unwrap();

        let message = invoke_turn(turn).await.unwrap();
        assert!(message.is_ai());
        assert_eq!(message.content, "Which city?");
    }
}
