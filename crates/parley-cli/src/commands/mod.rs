//! Slash commands for interactive mode

mod rate;
mod select;
mod thread;

pub use rate::RateCommand;
pub use select::SelectCommand;
pub use thread::ThreadCommand;

use parley_schema::{Feedback, ServiceMetadata};

/// What a command needs to know about the current session
pub struct CommandContext<'a> {
    pub info: Option<&'a ServiceMetadata>,
    pub agent: &'a str,
    pub model: Option<&'a str>,
    pub thread_id: &'a str,
    pub last_run_id: Option<&'a str>,
    pub stream_tokens: bool,
}

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Start a fresh thread
    NewThread,
    /// Switch to an existing thread and load its history
    SwitchThread(String),
    ChangeAgent(String),
    ChangeModel(String),
    SetStreamTokens(bool),
    /// Send feedback for a run
    Rate(Feedback),
    /// Show a message to the user (not sent to the agent)
    Message(String),
    /// Open agent selector (TUI only)
    OpenAgentSelector,
    /// Open model selector (TUI only)
    OpenModelSelector,
    Exit,
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, ctx: &CommandContext<'_>) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or_default().to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "new" | "n" => CommandResult::NewThread,

        "thread" | "t" => ThreadCommand::execute(args, ctx),

        "agent" | "a" => SelectCommand::agent(args, ctx),

        "model" | "m" => SelectCommand::model(args, ctx),

        "tokens" => CommandResult::SetStreamTokens(!ctx.stream_tokens),

        "rate" | "r" => RateCommand::execute(args, ctx),

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /new, /n             Start a new thread
  /thread, /t [id]     Show the current thread or switch to another
  /agent, /a [key]     List agents or switch to one
  /model, /m [name]    List models or switch to one
  /tokens              Toggle token streaming
  /rate, /r <1-5>      Rate the last answer
  /quit, /exit, /q     Exit parley

Examples:
  /agent chatbot       Talk to the chatbot agent
  /thread 4f1c...      Continue an earlier conversation
  /rate 5              Send five stars for the last answer"#
        .to_string()
}
