//! Agent instances keyed by agent and model

use parley_agent::{AgentGraph, AskHumanTool, BoxedTool, Checkpointer, ReactAgent};
use parley_ai::{ModelSpec, providers::get_api_key, providers::openai::OpenAICompatProvider};
use parley_schema::AgentInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    config::{AgentConfig, ModelConfig, ServiceConfig},
    error::ApiError,
};

/// Builds the graph for one agent/model pair
pub type GraphBuilder = Box<
    dyn Fn(&AgentConfig, &ModelConfig, Arc<dyn Checkpointer>, Vec<BoxedTool>) -> anyhow::Result<Arc<dyn AgentGraph>>
        + Send
        + Sync,
>;

/// Build a tool-calling graph over an OpenAI-compatible endpoint
pub fn build_react_graph(
    agent: &AgentConfig,
    model: &ModelConfig,
    checkpointer: Arc<dyn Checkpointer>,
    tools: Vec<BoxedTool>,
) -> anyhow::Result<Arc<dyn AgentGraph>> {
    let mut spec = ModelSpec::new(&model.name, &model.model_id, &model.base_url);
    spec.temperature = model.temperature;
    spec.max_tokens = model.max_tokens;
    if let Some(var) = &model.api_key_env {
        spec.api_key = Some(get_api_key(None, var)?);
    }

    let mut builder = ReactAgent::builder(&agent.key, Arc::new(OpenAICompatProvider::new(spec)), checkpointer)
        .max_steps(agent.max_steps)
        .tools(tools);
    if let Some(prompt) = &agent.system_prompt {
        builder = builder.system_prompt(prompt);
    }
    Ok(Arc::new(builder.build()))
}

/// Lazily built graphs, at most one per `agent:model` key.
///
/// Every graph is built on the same checkpointer, so any instance can read
/// any thread.
pub struct AgentRegistry {
    config: Arc<ServiceConfig>,
    checkpointer: Arc<dyn Checkpointer>,
    server_tools: HashMap<String, Vec<BoxedTool>>,
    builder: GraphBuilder,
    cache: Mutex<HashMap<String, Arc<dyn AgentGraph>>>,
}

impl AgentRegistry {
    pub fn new(
        config: Arc<ServiceConfig>,
        checkpointer: Arc<dyn Checkpointer>,
        server_tools: HashMap<String, Vec<BoxedTool>>,
        builder: GraphBuilder,
    ) -> Self {
        Self {
            config,
            checkpointer,
            server_tools,
            builder,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    /// Agents in configuration order
    pub fn agent_info(&self) -> Vec<AgentInfo> {
        self.config
            .agents
            .iter()
            .map(|a| AgentInfo {
                key: a.key.clone(),
                description: a.description.clone(),
            })
            .collect()
    }

    fn tools_for(&self, agent: &AgentConfig) -> Vec<BoxedTool> {
        let mut tools: Vec<BoxedTool> = agent
            .mcp_servers
            .iter()
            .filter_map(|name| self.server_tools.get(name))
            .flatten()
            .cloned()
            .collect();
        if agent.ask_human {
            tools.push(Arc::new(AskHumanTool));
        }
        tools
    }

    /// Get or build the graph for `agent_id`, using the default model if
    /// none is given.
    pub async fn get(&self, agent_id: &str, model: Option<&str>) -> Result<Arc<dyn AgentGraph>, ApiError> {
        let agent = self
            .config
            .agent(agent_id)
            .ok_or_else(|| ApiError::NotFound(format!("Agent {} not found", agent_id)))?;
        let model_name = model.unwrap_or(&self.config.default_model);
        let model = self
            .config
            .model(model_name)
            .ok_or_else(|| ApiError::Unprocessable(format!("Unknown model: {}", model_name)))?;

        let key = format!("{}:{}", agent.key, model.name);
        let mut cache = self.cache.lock().await;
        if let Some(graph) = cache.get(&key) {
            return Ok(graph.clone());
        }

        tracing::info!(agent = %agent.key, model = %model.name, "Creating new agent instance");
        let graph = (self.builder)(agent, model, self.checkpointer.clone(), self.tools_for(agent))
            .map_err(ApiError::Internal)?;
        cache.insert(key, graph.clone());
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_agent::MemoryCheckpointer;
    use parley_agent::testing::ScriptedGraph;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type SeenTools = Arc<std::sync::Mutex<Vec<Vec<String>>>>;

    fn counting_registry(config: ServiceConfig) -> (AgentRegistry, Arc<AtomicUsize>, SeenTools) {
        let builds = Arc::new(AtomicUsize::new(0));
        let seen: SeenTools = Arc::default();
        let counter = builds.clone();
        let seen_tools = seen.clone();
        let builder: GraphBuilder = Box::new(move |agent, _model, _store, tools| {
            counter.fetch_add(1, Ordering::SeqCst);
            seen_tools
                .lock()
                .unwrap()
                .push(tools.iter().map(|t| t.name().to_string()).collect());
            Ok(Arc::new(ScriptedGraph::emitting(agent.key.clone(), vec![])) as Arc<dyn AgentGraph>)
        });
        let registry = AgentRegistry::new(
            Arc::new(config),
            Arc::new(MemoryCheckpointer::new()),
            HashMap::new(),
            builder,
        );
        (registry, builds, seen)
    }

    #[tokio::test]
    async fn test_one_instance_per_agent_and_model() {
        let mut config = ServiceConfig::default();
        let mut other = config.models[0].clone();
        other.name = "big".into();
        config.models.push(other);
        let (registry, builds, _) = counting_registry(config);

        registry.get("research-assistant", None).await.unwrap();
        registry.get("research-assistant", Some("ollama")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        registry.get("research-assistant", Some("big")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_agent_and_model() {
        let (registry, _, _) = counting_registry(ServiceConfig::default());

        let err = registry.get("nope", None).await.err().unwrap();
        assert!(matches!(err, ApiError::NotFound(m) if m == "Agent nope not found"));

        let err = registry.get("research-assistant", Some("gpt-9")).await.err().unwrap();
        assert!(matches!(err, ApiError::Unprocessable(m) if m == "Unknown model: gpt-9"));
    }

    #[tokio::test]
    async fn test_ask_human_tool_added_when_enabled() {
        let mut config = ServiceConfig::default();
        config.agents[0].ask_human = true;
        let (registry, _, seen) = counting_registry(config);

        registry.get("research-assistant", None).await.unwrap();
        assert_eq!(seen.lock().unwrap().last().unwrap(), &vec!["ask_human".to_string()]);
    }

    #[test]
    fn test_agent_info_in_config_order() {
        let mut config = ServiceConfig::default();
        let mut second = config.agents[0].clone();
        second.key = "chatbot".into();
        config.agents.push(second);
        let (registry, _, _) = counting_registry(config);

        let keys: Vec<String> = registry.agent_info().into_iter().map(|a| a.key).collect();
        assert_eq!(keys, vec!["research-assistant", "chatbot"]);
    }
}
