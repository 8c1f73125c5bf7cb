//! Error types for the counter layer and its store backends.

use std::path::PathBuf;

/// Errors raised by a [`Store`](crate::store::Store) while executing a batch.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached, or the connection broke mid-batch
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The store answered an operation with an error reply
    #[error("store command failed: {0}")]
    Command(String),

    /// The reply did not have the shape the operation expects
    #[error("unexpected reply for {op}: {reply}")]
    UnexpectedReply { op: &'static str, reply: String },

    /// Error from the Redis client
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Errors from loading backend configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors surfaced by the public counter API.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Rejected before any store call (bad `group_by`, no hosts, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored value could not be read as an integer count
    #[error("value at {key} is not an integer: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AnalyticsError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        AnalyticsError::InvalidArgument(msg.into())
    }
}

pub type Result<T, E = AnalyticsError> = std::result::Result<T, E>;
