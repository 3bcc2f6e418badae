pub mod openai;

use crate::{Context, Error, MessageEventStream, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Key this model is registered under in the host
    fn name(&self) -> &str;

    async fn stream(&self, context: &Context) -> Result<MessageEventStream>;
}

/// Use `provided`, falling back to the `env_var` environment variable
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    match provided {
        Some(key) => Ok(key.to_string()),
        None => std::env::var(env_var).map_err(|_| Error::MissingApiKey(env_var.to_string())),
    }
}
