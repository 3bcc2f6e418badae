//! Server configuration file and environment overrides

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A chat model clients can select by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// OpenAI-compatible base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    pub model_id: String,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_max_steps() -> usize {
    parley_agent::react::DEFAULT_MAX_STEPS
}

/// An agent the host serves under `/{key}/...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub key: String,
    pub description: String,
    /// `{date}` is replaced with today's date
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Names of `[[mcp_servers]]` whose tools this agent gets
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    /// Give the agent the interrupting `ask_human` tool
    #[serde(default)]
    pub ask_human: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub kind: CheckpointKind,
    /// Directory for file checkpoints; defaults under the local data dir
    pub dir: Option<PathBuf>,
}

impl CheckpointConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("parley")
                .join("threads")
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// POST feedback here; log it when unset
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
}

/// Node names the event translator treats specially
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Nodes whose output is shown as tool output
    pub subagent_nodes: Vec<String>,
    /// Nodes whose updates repeat history; only the last AI message is kept
    pub supervisor_nodes: Vec<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            subagent_nodes: vec!["research_expert".into(), "math_expert".into()],
            supervisor_nodes: vec!["supervisor".into()],
        }
    }
}

/// Everything the agent host reads at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Bearer secret; auth is off when unset
    pub auth_secret: Option<String>,
    pub default_agent: String,
    pub default_model: String,
    pub models: Vec<ModelConfig>,
    pub agents: Vec<AgentConfig>,
    pub mcp_servers: Vec<McpServerConfig>,
    pub checkpoint: CheckpointConfig,
    pub feedback: FeedbackConfig,
    pub translator: TranslatorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth_secret: None,
            default_agent: "research-assistant".to_string(),
            default_model: "ollama".to_string(),
            models: vec![ModelConfig {
                name: "ollama".to_string(),
                base_url: "http://localhost:11434/v1".to_string(),
                model_id: "llama3.2".to_string(),
                api_key_env: None,
                temperature: Some(0.7),
                max_tokens: None,
            }],
            agents: vec![AgentConfig {
                key: "research-assistant".to_string(),
                description: "Ask me anything! I can search for information and do calculations."
                    .to_string(),
                system_prompt: Some(
                    "You are a helpful research assistant. Today's date is {date}. \
                     Use your tools when they help, and answer concisely."
                        .to_string(),
                ),
                mcp_servers: vec![],
                ask_human: false,
                max_steps: default_max_steps(),
            }],
            mcp_servers: vec![],
            checkpoint: CheckpointConfig::default(),
            feedback: FeedbackConfig::default(),
            translator: TranslatorConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Get the config file path: `PARLEY_CONFIG_PATH` or the user config dir
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("server.toml")
    }

    /// Load from `path` (or the default location), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if explicit || path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `HOST`, `PORT`, `AUTH_SECRET`, `DEFAULT_MODEL`,
    /// `OLLAMA_BASE_URL` and `CHECKPOINT_DIR`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT {:?}", port),
            }
        }
        if let Some(secret) = lookup("AUTH_SECRET").filter(|s| !s.is_empty()) {
            self.auth_secret = Some(secret);
        }
        if let Some(model) = lookup("DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            for model in self.models.iter_mut().filter(|m| m.name == "ollama") {
                model.base_url = url.clone();
            }
        }
        if let Some(dir) = lookup("CHECKPOINT_DIR") {
            self.checkpoint.kind = CheckpointKind::File;
            self.checkpoint.dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut keys = HashSet::new();
        for agent in &self.agents {
            if !keys.insert(agent.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent key '{}'",
                    agent.key
                )));
            }
            for server in &agent.mcp_servers {
                if self.mcp_server(server).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "agent '{}' uses unknown MCP server '{}'",
                        agent.key, server
                    )));
                }
            }
        }
        if self.agent(&self.default_agent).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default agent '{}' is not configured",
                self.default_agent
            )));
        }
        if self.model(&self.default_model).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default model '{}' is not configured",
                self.default_model
            )));
        }
        Ok(())
    }

    pub fn agent(&self, key: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.key == key)
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn mcp_server(&self, name: &str) -> Option<&McpServerConfig> {
        self.mcp_servers.iter().find(|s| s.name == name)
    }

    /// Model names, sorted
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|m| m.name.clone()).collect();
        names.sort();
        names
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.model("ollama").unwrap().temperature, Some(0.7));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config.apply_env(env(&[
            ("PORT", "9000"),
            ("AUTH_SECRET", "s3cret"),
            ("OLLAMA_BASE_URL", "http://gpu:11434/v1"),
            ("CHECKPOINT_DIR", "/var/lib/parley"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.auth_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.model("ollama").unwrap().base_url, "http://gpu:11434/v1");
        assert_eq!(config.checkpoint.kind, CheckpointKind::File);
        assert_eq!(config.checkpoint.resolved_dir(), PathBuf::from("/var/lib/parley"));
    }

    #[test]
    fn test_bad_port_and_empty_secret_ignored() {
        let mut config = ServiceConfig::default();
        config.apply_env(env(&[("PORT", "eighty"), ("AUTH_SECRET", "")]));
        assert_eq!(config.port, 8080);
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn test_parse_file_with_agents_and_servers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(
            &path,
            r#"
default_agent = "mcp-agent"
default_model = "gpt"

[[models]]
name = "gpt"
base_url = "https://api.openai.com/v1"
model_id = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[[agents]]
key = "mcp-agent"
description = "Uses tool servers"
mcp_servers = ["math"]
ask_human = true

[[mcp_servers]]
name = "math"
command = "python"
args = ["math_server.py"]
"#,
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        config.validate().unwrap();
        let agent = config.agent("mcp-agent").unwrap();
        assert!(agent.ask_human);
        assert_eq!(agent.max_steps, 25);
        assert_eq!(config.mcp_server("math").unwrap().args, vec!["math_server.py"]);
        assert_eq!(config.translator.subagent_nodes.len(), 2);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ServiceConfig::default();
        config.default_agent = "nope".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ServiceConfig::default();
        config.agents[0].mcp_servers.push("missing".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("missing")));

        let mut config = ServiceConfig::default();
        let dup = config.agents[0].clone();
        config.agents.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_names_sorted() {
        let mut config = ServiceConfig::default();
        let mut extra = config.models[0].clone();
        extra.name = "anthropic-proxy".into();
        config.models.push(extra);
        assert_eq!(config.model_names(), vec!["anthropic-proxy", "ollama"]);
    }
}
