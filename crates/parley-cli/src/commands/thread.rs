//! /thread command - show or switch the conversation thread

use super::{CommandContext, CommandResult};

pub struct ThreadCommand;

impl ThreadCommand {
    pub fn execute(args: &str, ctx: &CommandContext<'_>) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!(
                "Thread: {}\nAgent: {}\nModel: {}\nToken streaming: {}",
                ctx.thread_id,
                ctx.agent,
                ctx.model.unwrap_or("(host default)"),
                if ctx.stream_tokens { "on" } else { "off" }
            ));
        }
        if args == ctx.thread_id {
            return CommandResult::Message(format!("Already on thread {}", args));
        }
        CommandResult::SwitchThread(args.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{context, metadata};

    #[test]
    fn test_show_and_switch() {
        let info = metadata();
        let ctx = context(&info);
        assert!(matches!(
            ThreadCommand::execute("", &ctx),
            CommandResult::Message(m) if m.starts_with("Thread: t1")
        ));
        assert_eq!(
            ThreadCommand::execute("t2", &ctx),
            CommandResult::SwitchThread("t2".into())
        );
        assert!(matches!(ThreadCommand::execute("t1", &ctx), CommandResult::Message(_)));
    }
}
