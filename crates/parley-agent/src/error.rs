use thiserror::Error;

use crate::mcp::McpError;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a run, resume or state lookup failed
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Ai(#[from] parley_ai::Error),

    /// The model stream failed after retries
    #[error("Model error: {0}")]
    Model(String),

    /// Reading or writing thread state failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Mcp(#[from] McpError),

    /// A resume value was sent to a thread that is not suspended
    #[error("Thread {0} has no pending interrupt to resume")]
    NoPendingInterrupt(String),

    /// A plain message was sent to a thread that is waiting for a resume value
    #[error("Thread {0} is waiting for a resume value")]
    ThreadInterrupted(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Checkpoint(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Checkpoint(e.to_string())
    }
}
