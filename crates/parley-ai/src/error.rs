use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to a chat completions backend
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status from the backend, with its error body
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Names the environment variable that should hold the key
    #[error("Missing API key: set {0}")]
    MissingApiKey(String),

    #[error("SSE error: {0}")]
    Sse(String),
}

impl Error {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Transient failures: throttling, server errors, dropped connections
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Sse(_) => true,
            Error::Api { status, .. } if *status == 429 || *status >= 500 => true,
            Error::Api { message, .. } => {
                let lower = message.to_lowercase();
                ["rate limit", "overloaded", "too many requests"]
                    .iter()
                    .any(|pattern| lower.contains(pattern))
            }
            Error::Json(_) | Error::MissingApiKey(_) => false,
        }
    }
}
