use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuillErr>;

#[derive(Debug, Error)]
pub enum QuillErr {
    /// A required configuration value was absent. Raised before any network
    /// traffic so automatic triggers can drop it without user-visible noise.
    #[error("{0} is not configured; set it in config.toml or pass the matching flag")]
    MissingConfig(&'static str),

    #[error("connection failed: {source}")]
    ConnectionFailed {
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// Error while the streaming body was being consumed.
    #[error("stream disconnected: {0}")]
    Stream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
}
