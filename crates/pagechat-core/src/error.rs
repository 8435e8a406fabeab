//! Error types for the relay, backend, storage, and setup paths.

use thiserror::Error;

/// Failures talking to the RAG backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed backend response: {0}")]
    MalformedBody(String),

    #[error("Backend response did not contain an answer")]
    MissingAnswer,
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::MalformedBody(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

/// Envelopes that fail validation at the panel/relay boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Message {index} is not an object")]
    MessageNotObject { index: usize },

    #[error("Relay is not running")]
    RelayUnavailable,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Could not determine data directory")]
    NoDataDir,
}

#[derive(Debug, Error)]
#[error("Failed to query active tab: {0}")]
pub struct TabQueryError(pub String);

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to enable panel surface: {0}")]
    Surface(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}
