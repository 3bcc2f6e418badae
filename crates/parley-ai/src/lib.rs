//! Chat model access for parley agents.
//!
//! [`ChatModel`] streams a reply for a [`Context`] as [`stream::MessageEvent`]s.
//! The only backend speaks the OpenAI `/chat/completions` dialect, which also
//! covers Ollama, vLLM and LM Studio.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::ChatModel;
pub use stream::MessageEventStream;
pub use types::*;
