//! Model calls with retry

use std::{pin::Pin, sync::Arc, time::Duration};

use async_stream::stream;
use futures::StreamExt;
use parley_ai::{ChatModel, Context, Message, stream::MessageBuilder, stream::MessageEvent};
use tokio_stream::Stream;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// What one model call reports
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A piece of response text
    TextDelta(String),
    /// The complete response
    Finished(Message),
    /// The call failed for good
    Failed(String),
}

/// A stream of transport events
pub type TransportStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Calls a chat model, retrying failures that happen before any output
#[derive(Clone)]
pub struct ModelTransport {
    model: Arc<dyn ChatModel>,
    retry_config: RetryConfig,
}

impl ModelTransport {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run one model call
    pub fn run(&self, context: Context) -> TransportStream {
        let model = self.model.clone();
        let retry = self.retry_config.clone();

        Box::pin(stream! {
            let mut attempt = 0u32;

            'attempts: loop {
                let mut events = match model.stream(&context).await {
                    Ok(events) => events,
                    Err(e) => {
                        if e.is_retryable() && attempt < retry.max_retries {
                            let delay = retry.delay_for_attempt(attempt);
                            tracing::warn!(
                                "Model request failed (attempt {}/{}): {}. Retrying in {:?}...",
                                attempt + 1,
                                retry.max_retries + 1,
                                e,
                                delay
                            );
                            attempt += 1;
                            tokio::time::sleep(delay).await;
                            continue 'attempts;
                        }
                        yield TransportEvent::Failed(e.to_string());
                        return;
                    }
                };

                let mut builder = MessageBuilder::new();
                let mut produced_output = false;

                while let Some(event) = events.next().await {
                    builder.process_event(&event);
                    match event {
                        MessageEvent::TextDelta { delta, .. } => {
                            produced_output = true;
                            yield TransportEvent::TextDelta(delta);
                        }
                        MessageEvent::ToolCallStart { .. } | MessageEvent::ToolCallDelta { .. } => {
                            produced_output = true;
                        }
                        MessageEvent::Done { message, .. } => {
                            yield TransportEvent::Finished(message);
                            return;
                        }
                        MessageEvent::Error { message, retryable } => {
                            if retryable && !produced_output && attempt < retry.max_retries {
                                let delay = retry.delay_for_attempt(attempt);
                                tracing::warn!(
                                    "Model stream failed (attempt {}/{}): {}. Retrying in {:?}...",
                                    attempt + 1,
                                    retry.max_retries + 1,
                                    message,
                                    delay
                                );
                                attempt += 1;
                                tokio::time::sleep(delay).await;
                                continue 'attempts;
                            }
                            yield TransportEvent::Failed(message);
                            return;
                        }
                        MessageEvent::Start { .. } => {}
                    }
                }

                // Closed without Done: keep whatever arrived
                if produced_output {
                    yield TransportEvent::Finished(builder.build());
                } else {
                    yield TransportEvent::Failed("model stream ended without a response".into());
                }
                return;
            }
        })
    }
}
