//! /agent and /model commands - list and switch

use super::{CommandContext, CommandResult};

pub struct SelectCommand;

impl SelectCommand {
    /// Execute /agent command - opens selector if no args, or switches to matching agent
    pub fn agent(args: &str, ctx: &CommandContext<'_>) -> CommandResult {
        if args.is_empty() {
            return CommandResult::OpenAgentSelector;
        }
        let keys: Vec<&str> = ctx
            .info
            .map(|info| info.agents.iter().map(|a| a.key.as_str()).collect())
            .unwrap_or_default();
        match find(args, &keys) {
            Some(key) => CommandResult::ChangeAgent(key.to_string()),
            None => CommandResult::Message(format!(
                "No agent found matching '{}'\nUse /agent to list available agents",
                args
            )),
        }
    }

    /// Execute /model command - opens selector if no args, or switches to matching model
    pub fn model(args: &str, ctx: &CommandContext<'_>) -> CommandResult {
        if args.is_empty() {
            return CommandResult::OpenModelSelector;
        }
        let names: Vec<&str> = ctx
            .info
            .map(|info| info.models.iter().map(String::as_str).collect())
            .unwrap_or_default();
        match find(args, &names) {
            Some(name) => CommandResult::ChangeModel(name.to_string()),
            None => CommandResult::Message(format!(
                "No model found matching '{}'\nUse /model to list available models",
                args
            )),
        }
    }

    /// List agents and models as text (for print mode)
    pub fn list_text(ctx: &CommandContext<'_>) -> String {
        let Some(info) = ctx.info else {
            return "Not connected".to_string();
        };
        let mut output = String::from("Agents:\n");
        for agent in &info.agents {
            let marker = if agent.key == ctx.agent { " *" } else { "" };
            output.push_str(&format!("  {}{}  {}\n", agent.key, marker, agent.description));
        }
        output.push_str("\nModels:\n");
        let current = ctx.model.unwrap_or(&info.default_model);
        for model in &info.models {
            let marker = if model == current { " *" } else { "" };
            output.push_str(&format!("  {}{}\n", model, marker));
        }
        output
    }
}

/// Exact match first, then the first partial match
fn find<'a>(query: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let query = query.to_lowercase();
    candidates
        .iter()
        .find(|c| c.to_lowercase() == query)
        .or_else(|| candidates.iter().find(|c| c.to_lowercase().contains(&query)))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{context, metadata};

    #[test]
    fn test_agent_matching() {
        let info = metadata();
        let ctx = context(&info);
        assert_eq!(SelectCommand::agent("", &ctx), CommandResult::OpenAgentSelector);
        assert_eq!(
            SelectCommand::agent("chat", &ctx),
            CommandResult::ChangeAgent("chatbot".into())
        );
        assert!(matches!(SelectCommand::agent("nope", &ctx), CommandResult::Message(_)));
    }

    #[test]
    fn test_model_exact_before_partial() {
        let info = metadata();
        let ctx = context(&info);
        assert_eq!(
            SelectCommand::model("OLLAMA", &ctx),
            CommandResult::ChangeModel("ollama".into())
        );
        assert_eq!(
            SelectCommand::model("4o", &ctx),
            CommandResult::ChangeModel("gpt-4o-mini".into())
        );
    }

    #[test]
    fn test_list_marks_current() {
        let info = metadata();
        let text = SelectCommand::list_text(&context(&info));
        assert!(text.contains("research-assistant *"));
        assert!(text.contains("ollama *"));
    }
}
