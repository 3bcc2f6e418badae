//! The agent graph contract

use async_trait::async_trait;
use futures::StreamExt;
use parley_ai::Message;

use crate::{
    error::{Error, Result},
    events::{GraphEvent, GraphEventStream, Interrupt},
};

/// What a turn feeds into a graph
#[derive(Debug, Clone)]
pub enum GraphInput {
    /// New messages appended to the thread
    Messages(Vec<Message>),
    /// Resolution for the thread's pending interrupt
    Resume(serde_json::Value),
}

/// Per-run configuration
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub thread_id: String,
    pub run_id: String,
    /// Model name the run was requested with
    pub model: Option<String>,
    /// Caller-supplied configuration forwarded to the graph
    pub configurable: serde_json::Map<String, serde_json::Value>,
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            ..Default::default()
        }
    }
}

/// A thread's current state as seen from outside the graph
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub messages: Vec<Message>,
    pub interrupts: Vec<Interrupt>,
}

impl StateSnapshot {
    /// Check whether the thread is suspended waiting for a resume value
    pub fn is_interrupted(&self) -> bool {
        !self.interrupts.is_empty()
    }
}

/// How a drained run ended
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    /// The run finished; all thread messages
    Completed(Vec<Message>),
    /// The run suspended on these interrupts
    Interrupted(Vec<Interrupt>),
}

/// An executable agent bound to a thread store
#[async_trait]
pub trait AgentGraph: Send + Sync {
    /// Graph name, used in logs
    fn name(&self) -> &str;

    /// Read the state of a thread; unknown threads are empty
    async fn get_state(&self, thread_id: &str) -> Result<StateSnapshot>;

    /// Start a run and stream its events
    fn stream(&self, input: GraphInput, config: RunConfig) -> GraphEventStream;

    /// Run to completion or interrupt and report the final result
    async fn invoke(&self, input: GraphInput, config: RunConfig) -> Result<InvokeOutcome> {
        let mut events = self.stream(input, config);
        let mut outcome = None;
        while let Some(event) = events.next().await {
            match event? {
                GraphEvent::Values { messages } => outcome = Some(InvokeOutcome::Completed(messages)),
                GraphEvent::Interrupt { interrupts } => {
                    outcome = Some(InvokeOutcome::Interrupted(interrupts))
                }
                _ => {}
            }
        }
        outcome.ok_or_else(|| Error::Other(format!("{} ended without a result", self.name())))
    }
}
