//! Conversation state shared by the TUI and print mode

use parley_schema::{ChatMessage, StreamInput, StreamUnit, UserInput};
use uuid::Uuid;

use crate::client::{self, AgentClient, UnitStream};
use crate::commands::{CommandContext, CommandResult};
use crate::transcript::Transcript;

/// What the front end should do after a command ran
#[derive(Debug, PartialEq)]
pub enum CommandOutcome {
    Notice(String),
    OpenAgentSelector,
    OpenModelSelector,
    Exit,
}

/// One thread with one agent host
pub struct Session {
    pub client: AgentClient,
    pub model: Option<String>,
    pub thread_id: String,
    pub stream_tokens: bool,
    pub transcript: Transcript,
}

impl Session {
    pub fn new(
        client: AgentClient,
        model: Option<String>,
        thread_id: Option<String>,
        stream_tokens: bool,
    ) -> Self {
        Self {
            client,
            model,
            thread_id: thread_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            stream_tokens,
            transcript: Transcript::new(),
        }
    }

    pub fn context(&self) -> CommandContext<'_> {
        CommandContext {
            info: self.client.info(),
            agent: self.client.agent(),
            model: self.model.as_deref(),
            thread_id: &self.thread_id,
            last_run_id: self.transcript.last_run_id(),
            stream_tokens: self.stream_tokens,
        }
    }

    /// Model shown in the status line
    pub fn model_label(&self) -> &str {
        self.model
            .as_deref()
            .or_else(|| self.client.info().map(|i| i.default_model.as_str()))
            .unwrap_or("default")
    }

    fn user_input(&self, message: &str) -> UserInput {
        UserInput {
            message: message.to_string(),
            model: self.model.clone(),
            thread_id: Some(self.thread_id.clone()),
            agent_config: None,
        }
    }

    /// Show the user's message and open the turn's stream
    pub fn start_turn(&mut self, message: &str) -> client::Result<UnitStream> {
        self.transcript.push_human(message);
        let input = StreamInput::new(self.user_input(message), self.stream_tokens);
        tracing::debug!(thread_id = %self.thread_id, agent = self.client.agent(), "Starting turn");
        self.client.stream(&input)
    }

    /// Run a whole turn without streaming and fold its final message
    pub async fn invoke_turn(&mut self, message: &str) -> client::Result<ChatMessage> {
        self.transcript.push_human(message);
        let answer = self.client.invoke(&self.user_input(message)).await?;
        self.transcript.apply(StreamUnit::message(answer.clone()));
        Ok(answer)
    }

    /// Fold one stream item; true once the turn is over
    pub fn apply_unit(&mut self, item: client::Result<StreamUnit>) -> bool {
        match item {
            Ok(unit) => {
                let done = unit.is_done();
                self.transcript.apply(unit);
                done
            }
            Err(e) => {
                tracing::warn!("Stream failed: {}", e);
                self.transcript.finish();
                self.transcript.push_warning(e.to_string());
                true
            }
        }
    }

    /// Abandon the running turn, keeping what arrived so far
    pub fn cancel_turn(&mut self) {
        self.transcript.finish();
        self.transcript.push_warning("Cancelled");
    }

    /// Switch threads and rebuild the transcript from the host's history
    pub async fn load_thread(&mut self, thread_id: &str) -> client::Result<usize> {
        let history = self.client.history(thread_id).await?;
        self.thread_id = thread_id.to_string();
        self.transcript = Transcript::from_history(history.messages);
        Ok(self.transcript.entries().len())
    }

    pub fn new_thread(&mut self) {
        self.thread_id = Uuid::new_v4().to_string();
        self.transcript.clear();
    }

    /// Carry out a parsed command
    pub async fn apply_command(&mut self, result: CommandResult) -> CommandOutcome {
        let notice = match result {
            CommandResult::NewThread => {
                self.new_thread();
                format!("New thread: {}", self.thread_id)
            }
            CommandResult::SwitchThread(id) => match self.load_thread(&id).await {
                Ok(count) => format!("Switched to thread {} ({} entries)", id, count),
                Err(e) => format!("Failed to load thread {}: {}", id, e),
            },
            CommandResult::ChangeAgent(key) => match self.client.set_agent(&key) {
                Ok(()) => format!("Switched to agent: {}", key),
                Err(e) => e.to_string(),
            },
            CommandResult::ChangeModel(name) => {
                let notice = format!("Switched to model: {}", name);
                self.model = Some(name);
                notice
            }
            CommandResult::SetStreamTokens(on) => {
                self.stream_tokens = on;
                format!("Token streaming {}", if on { "on" } else { "off" })
            }
            CommandResult::Rate(feedback) => match self.client.feedback(&feedback).await {
                Ok(()) => format!("Thanks! Recorded {:.1} for run {}", feedback.score, feedback.run_id),
                Err(e) => format!("Failed to send feedback: {}", e),
            },
            CommandResult::Message(msg) => msg,
            CommandResult::OpenAgentSelector => return CommandOutcome::OpenAgentSelector,
            CommandResult::OpenModelSelector => return CommandOutcome::OpenModelSelector,
            CommandResult::Exit => return CommandOutcome::Exit,
            CommandResult::Unknown(cmd) => format!(
                "Unknown command: /{}\nType /help for available commands.",
                cmd
            ),
        };
        CommandOutcome::Notice(notice)
    }
}
