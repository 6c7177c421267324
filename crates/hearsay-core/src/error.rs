use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure of a single query, reported exactly once per submission.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyText,

    #[error("access token is empty")]
    EmptyToken,

    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("session closed before the query completed")]
    Cancelled,
}

impl QueryError {
    /// Whether a retry could plausibly succeed. Auth rejections and input
    /// validation failures are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QueryError::Network(_) | QueryError::Timeout(_) | QueryError::Protocol(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build stream: {0}")]
    StreamBuild(String),

    #[error("stream error: {0}")]
    StreamError(String),
}
