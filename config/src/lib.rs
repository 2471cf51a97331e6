use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("environment variable {0} is not set; it must hold the model provider API key")]
    MissingApiKey(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SqlChatConfig {
    pub server: ServerConfig,
    pub ai: AIConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Upper bound for one chat request, model round-trips and tool calls included.
    pub request_timeout_secs: u64,
    /// Comma separated list of allowed origins. Any origin when unset.
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 120,
            cors_allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AIConfig {
    pub model: String,
    pub url: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the config file.
    pub api_key_env: String,
    pub max_steps: usize,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-oss-120b:free".to_string(),
            url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            max_steps: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub seed_demo_data: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sqlchat.db".to_string(),
            seed_demo_data: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter expression, e.g. `info` or `debug,tower_http=warn`.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl SqlChatConfig {
    /// Loads the config file (if any) and applies environment overrides.
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn get_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SQLCHAT_CONFIG") {
            return Some(PathBuf::from(path));
        }
        let home_dir = std::env::var("HOME").ok()?;
        Some(PathBuf::from(format!("{home_dir}/.config/sqlchat/config.toml")))
    }

    /// Applies `SQLCHAT_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("SQLCHAT_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = lookup("SQLCHAT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(model) = lookup("SQLCHAT_MODEL") {
            self.ai.model = model;
        }
        if let Some(url) = lookup("SQLCHAT_MODEL_URL") {
            self.ai.url = url;
        }
        if let Some(level) = lookup("SQLCHAT_LOG") {
            self.log.level = level;
        }
        if let Some(json) = lookup("SQLCHAT_LOG_JSON") {
            match json.to_ascii_lowercase().as_str() {
                "1" | "true" => self.log.json = true,
                "0" | "false" => self.log.json = false,
                _ => {}
            }
        }
        if let Some(secs) = lookup("SQLCHAT_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.server.request_timeout_secs = secs;
        }
    }

    /// Reads the model provider API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.ai.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.ai.api_key_env.clone()))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("http://{}/api/chat", self.server.bind)
    }
}
