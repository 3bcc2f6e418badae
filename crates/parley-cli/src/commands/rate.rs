//! /rate command - star rating for the last answer

use super::{CommandContext, CommandResult};
use parley_schema::Feedback;

/// Feedback key the host forwards to its tracing backend
pub const STARS_KEY: &str = "human-feedback-stars";

pub struct RateCommand;

impl RateCommand {
    /// Execute /rate command - turns 1 to 5 stars into a score in (0, 1]
    pub fn execute(args: &str, ctx: &CommandContext<'_>) -> CommandResult {
        let stars = match args.parse::<u8>() {
            Ok(stars @ 1..=5) => stars,
            _ => return CommandResult::Message("Usage: /rate <1-5>".to_string()),
        };
        let Some(run_id) = ctx.last_run_id else {
            return CommandResult::Message("Nothing to rate yet".to_string());
        };

        let mut kwargs = serde_json::Map::new();
        kwargs.insert("comment".into(), "In-line human feedback".into());
        CommandResult::Rate(Feedback {
            run_id: run_id.to_string(),
            key: STARS_KEY.to_string(),
            score: f64::from(stars) / 5.0,
            kwargs,
        })
    }
}
