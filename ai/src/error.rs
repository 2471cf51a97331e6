use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not reach model provider: {0}")]
    Transport(String),

    #[error("could not decode model response: {0}")]
    Decode(String),
}

impl ModelError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            ModelError::Status { message, .. }
            | ModelError::Transport(message)
            | ModelError::Decode(message) => message,
        }
    }

    /// Status 429, or a message with a word starting with "rate"
    /// ("rate limit", "rate-limited", "ratelimit", but not "generate").
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        self.status() == Some(429)
            || self
                .message()
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word.starts_with("rate"))
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ModelError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => ModelError::Decode(err.to_string()),
            None => ModelError::Transport(err.to_string()),
        }
    }
}
