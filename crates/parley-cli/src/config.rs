//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Client settings; every field can also come from flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Agent host base URL
    pub url: Option<String>,
    /// Agent to talk to; the host's default when unset
    pub agent: Option<String>,
    /// Model to request; the host's default when unset
    pub model: Option<String>,
    /// Stream tokens as they are generated (true by default)
    pub stream_tokens: Option<bool>,
    /// Bearer secret for hosts that require one
    pub auth_secret: Option<String>,
}

impl ClientConfig {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PARLEY_CLIENT_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("client.toml")
    }

    /// Load config from file, then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::load_from(&Self::config_path());
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Read one config file; a missing or broken file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// `AGENT_URL` wins over `HOST`/`PORT`; `AUTH_SECRET` sets the bearer
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AGENT_URL").filter(|u| !u.is_empty()) {
            self.url = Some(url);
        } else if self.url.is_none() {
            let host = lookup("HOST");
            let port = lookup("PORT");
            if host.is_some() || port.is_some() {
                self.url = Some(format!(
                    "http://{}:{}",
                    host.as_deref().unwrap_or("0.0.0.0"),
                    port.as_deref().unwrap_or("8080")
                ));
            }
        }
        if let Some(secret) = lookup("AUTH_SECRET").filter(|s| !s.is_empty()) {
            self.auth_secret = Some(secret);
        }
    }

    pub fn base_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| "http://0.0.0.0:8080".to_string())
    }

    pub fn stream_tokens(&self) -> bool {
        self.stream_tokens.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), "http://0.0.0.0:8080");
        assert!(config.stream_tokens());
    }

    #[test]
    fn test_agent_url_wins() {
        let mut config = ClientConfig::default();
        config.apply_env(env(&[
            ("AGENT_URL", "https://agents.example.com"),
            ("HOST", "localhost"),
            ("AUTH_SECRET", "s3cret"),
        ]));
        assert_eq!(config.base_url(), "https://agents.example.com");
        assert_eq!(config.auth_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_host_and_port() {
        let mut config = ClientConfig::default();
        config.apply_env(env(&[("PORT", "9000")]));
        assert_eq!(config.base_url(), "http://0.0.0.0:9000");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "agent = \"chatbot\"\nauth_secret = \"s3cret\"\n").unwrap();

        let config = ClientConfig::load_from(&path);
        assert_eq!(config.agent.as_deref(), Some("chatbot"));
        assert_eq!(config.auth_secret.as_deref(), Some("s3cret"));

        std::fs::write(&path, "agent = [").unwrap();
        assert_eq!(ClientConfig::load_from(&path), ClientConfig::default());
        assert_eq!(ClientConfig::load_from(&dir.path().join("missing.toml")), ClientConfig::default());
    }

    #[test]
    fn test_file_url_kept_without_agent_url() {
        let mut config: ClientConfig = toml::from_str(
            r#"
url = "http://gpu-box:8080"
agent = "chatbot"
stream_tokens = false
"#,
        )
        .unwrap();
        config.apply_env(env(&[("HOST", "localhost")]));
        assert_eq!(config.base_url(), "http://gpu-box:8080");
        assert_eq!(config.agent.as_deref(), Some("chatbot"));
        assert!(!config.stream_tokens());
    }
}
