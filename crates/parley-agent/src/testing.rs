//! Scripted graph for exercising code that drives an [`AgentGraph`]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    events::{GraphEvent, GraphEventStream},
    graph::{AgentGraph, GraphInput, RunConfig, StateSnapshot},
};

/// One scripted stream item; `Fail` ends the run with an execution error.
#[derive(Debug, Clone)]
pub enum Step {
    Emit(GraphEvent),
    Fail(String),
}

/// Replays the same event script on every run and records its inputs.
pub struct ScriptedGraph {
    name: String,
    script: Vec<Step>,
    states: Mutex<HashMap<String, StateSnapshot>>,
    runs: Mutex<Vec<(GraphInput, RunConfig)>>,
}

impl ScriptedGraph {
    pub fn new(name: impl Into<String>, script: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            script,
            states: Mutex::new(HashMap::new()),
            runs: Mutex::new(vec![]),
        }
    }

    /// Convenience for scripts without failures
    pub fn emitting(name: impl Into<String>, events: Vec<GraphEvent>) -> Self {
        Self::new(name, events.into_iter().map(Step::Emit).collect())
    }

    /// Report `snapshot` from `get_state` for this thread
    pub fn with_state(self, thread_id: impl Into<String>, snapshot: StateSnapshot) -> Self {
        self.states.lock().insert(thread_id.into(), snapshot);
        self
    }

    /// Every `(input, config)` the graph was started with
    pub fn runs(&self) -> Vec<(GraphInput, RunConfig)> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl AgentGraph for ScriptedGraph {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_state(&self, thread_id: &str) -> Result<StateSnapshot> {
        Ok(self.states.lock().get(thread_id).cloned().unwrap_or_default())
    }

    fn stream(&self, input: GraphInput, config: RunConfig) -> GraphEventStream {
        self.runs.lock().push((input, config));
        let items: Vec<Result<GraphEvent>> = self
            .script
            .iter()
            .map(|step| match step {
                Step::Emit(event) => Ok(event.clone()),
                Step::Fail(message) => Err(Error::Other(message.clone())),
            })
            .collect();
        Box::pin(futures::stream::iter(items))
    }
}
