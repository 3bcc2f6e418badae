//! HTTP client for the agent host

use futures::StreamExt;
use parley_schema::{
    ChatHistory, ChatHistoryInput, ChatMessage, Feedback, ServiceMetadata, StreamError,
    StreamInput, StreamUnit, UserInput,
};
use reqwest::Method;
use reqwest_eventsource::{Event, EventSource};
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Unit(#[from] StreamError),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}

impl ClientError {
    /// Build a status error, preferring the host's `{"detail": ...}` text
    fn status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.to_string());
        Self::Status { status, detail }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub type UnitStream = Pin<Box<dyn Stream<Item = Result<StreamUnit>> + Send>>;

/// Talks to one agent host on behalf of the transcript client
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    auth_secret: Option<String>,
    agent: String,
    info: Option<ServiceMetadata>,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>, auth_secret: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_secret,
            agent: String::new(),
            info: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch `/info`; the host's default agent is used unless one is set
    pub async fn connect(&mut self) -> Result<&ServiceMetadata> {
        let info = self.fetch_info().await?;
        if self.agent.is_empty() {
            self.agent = info.default_agent.clone();
        }
        Ok(self.info.insert(info))
    }

    pub fn info(&self) -> Option<&ServiceMetadata> {
        self.info.as_ref()
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Switch agents, checking the key against `/info` once connected
    pub fn set_agent(&mut self, key: &str) -> Result<()> {
        if let Some(info) = &self.info {
            if !info.agents.iter().any(|a| a.key == key) {
                return Err(ClientError::UnknownAgent(key.to_string()));
            }
        }
        self.agent = key.to_string();
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.http.request(method, url);
        if let Some(secret) = &self.auth_secret {
            builder = builder.bearer_auth(secret);
        }
        builder
    }

    fn agent_path(&self, action: &str) -> String {
        if self.agent.is_empty() {
            action.to_string()
        } else {
            format!("{}/{}", self.agent, action)
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::status(status, &body))
    }

    async fn fetch_info(&self) -> Result<ServiceMetadata> {
        let response = self.request(Method::GET, "info").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Run a whole turn and return its final message
    pub async fn invoke(&self, input: &UserInput) -> Result<ChatMessage> {
        let response = self
            .request(Method::POST, &self.agent_path("invoke"))
            .json(input)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Run a turn and yield its units up to and including `[DONE]`.
    ///
    /// A unit that does not parse becomes an error unit and reading goes on.
    /// A stream that ends without the sentinel yields
    /// [`StreamError::Truncated`] last.
    pub fn stream(&self, input: &StreamInput) -> Result<UnitStream> {
        let builder = self
            .request(Method::POST, &self.agent_path("stream"))
            .json(input);
        let mut source = EventSource::new(builder)
            .map_err(|e| ClientError::Stream(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => match StreamUnit::from_data(&msg.data) {
                        Ok(unit) => {
                            let done = unit.is_done();
                            yield Ok(unit);
                            if done {
                                source.close();
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Skipping bad stream unit: {}", e);
                            yield Ok(StreamUnit::error(e.to_string()));
                        }
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body = response.text().await.unwrap_or_default();
                        yield Err(ClientError::status(status.as_u16(), &body));
                        source.close();
                        return;
                    }
                    Err(e) => {
                        yield Err(ClientError::Stream(e.to_string()));
                        source.close();
                        return;
                    }
                }
            }
            source.close();
            yield Err(StreamError::Truncated.into());
        }))
    }

    pub async fn history(&self, thread_id: &str) -> Result<ChatHistory> {
        let response = self
            .request(Method::POST, "history")
            .json(&ChatHistoryInput {
                thread_id: thread_id.to_string(),
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn feedback(&self, feedback: &Feedback) -> Result<()> {
        let response = self
            .request(Method::POST, "feedback")
            .json(feedback)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
