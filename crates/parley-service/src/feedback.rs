//! Where run feedback goes

use async_trait::async_trait;
use parley_schema::Feedback;

use crate::config::FeedbackConfig;

/// Records feedback on a run
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, feedback: &Feedback) -> anyhow::Result<()>;
}

/// Writes feedback to the log only
pub struct LogFeedbackSink;

#[async_trait]
impl FeedbackSink for LogFeedbackSink {
    async fn record(&self, feedback: &Feedback) -> anyhow::Result<()> {
        tracing::info!(
            run_id = %feedback.run_id,
            key = %feedback.key,
            score = feedback.score,
            kwargs = %serde_json::Value::Object(feedback.kwargs.clone()),
            "feedback recorded"
        );
        Ok(())
    }
}

/// POSTs feedback as JSON to an external recorder
pub struct HttpFeedbackSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpFeedbackSink {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// `{run_id, key, score, ...kwargs}`
    fn body(feedback: &Feedback) -> serde_json::Value {
        let mut body = feedback.kwargs.clone();
        body.insert("run_id".into(), feedback.run_id.clone().into());
        body.insert("key".into(), feedback.key.clone().into());
        body.insert("score".into(), feedback.score.into());
        serde_json::Value::Object(body)
    }
}

#[async_trait]
impl FeedbackSink for HttpFeedbackSink {
    async fn record(&self, feedback: &Feedback) -> anyhow::Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&Self::body(feedback));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("feedback endpoint returned {}: {}", status, text);
        }
        Ok(())
    }
}

/// Build the sink the configuration asks for
pub fn sink_from_config(config: &FeedbackConfig) -> Box<dyn FeedbackSink> {
    match &config.endpoint {
        Some(endpoint) => {
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok());
            tracing::info!("Feedback is forwarded to {}", endpoint);
            Box::new(HttpFeedbackSink::new(endpoint.clone(), api_key))
        }
        None => Box::new(LogFeedbackSink),
    }
}
