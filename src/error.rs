use thiserror::Error;

/// Errors raised by the reformation engine.
///
/// `Format` and `Internal` are fatal for the current input file: the engine
/// never retries them. Audio repairs are not errors at all; they are logged
/// and accounted for in the drift statistics.
#[derive(Error, Debug)]
pub enum ReformError {
    /// Reading or writing a snapshot or config file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The input stream has no coherent configuration.
    #[error("format error: {0}")]
    Format(String),

    /// An engine invariant was broken.
    #[error("internal consistency error: {0}")]
    Internal(String),

    /// A snapshot or other serialized input is malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Unusable configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Report serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReformError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ReformError::Format(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        ReformError::Internal(msg.into())
    }

    /// Returns true for errors caused by the input rather than the engine.
    pub fn is_format_error(&self) -> bool {
        matches!(self, ReformError::Format(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReformError>;
