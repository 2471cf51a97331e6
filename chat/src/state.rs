use std::sync::Arc;
use std::time::Duration;

use ai::ModelClient;
use config::SqlChatConfig;
use db::Database;

/// Per-request limits of the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    /// Model calls allowed per request, tool round-trips included.
    pub max_steps: usize,
    pub request_timeout: Duration,
    pub cors_allowed_origins: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_steps: 5,
            request_timeout: Duration::from_secs(120),
            cors_allowed_origins: None,
        }
    }
}

impl ChatSettings {
    #[must_use]
    pub fn from_config(conf: &SqlChatConfig) -> Self {
        Self {
            max_steps: conf.ai.max_steps.max(1),
            request_timeout: conf.request_timeout(),
            cors_allowed_origins: conf.server.cors_allowed_origins.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub model: Arc<dyn ModelClient>,
    pub database: Arc<dyn Database>,
    pub settings: ChatSettings,
}

impl AppState {
    pub fn new(model: Arc<dyn ModelClient>, database: Arc<dyn Database>, settings: ChatSettings) -> Self {
        Self {
            model,
            database,
            settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut conf = SqlChatConfig::default();
        conf.ai.max_steps = 0;
        conf.server.request_timeout_secs = 30;
        conf.server.cors_allowed_origins = Some("http://localhost:5173".to_string());

        let settings = ChatSettings::from_config(&conf);
        assert_eq!(settings.max_steps, 1);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.cors_allowed_origins.as_deref(), Some("http://localhost:5173"));
    }
}
