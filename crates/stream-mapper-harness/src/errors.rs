use stream_mapper_core::{ConfigError, PathError};

/// Top-level error type for the harness API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Invalid mapping or endpoint configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (empty URL, zero buffer size, bad path).
    #[error("validation error: {0}")]
    Validation(String),
    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    /// A one-shot body that is not a JSON document.
    #[error("response body is not JSON: {0}")]
    InvalidBody(String),
    /// A one-shot extraction whose path resolved to nothing.
    #[error("nothing found at path `{path}`")]
    NotFound { path: String },
    /// The run was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl HarnessError {
    pub(crate) fn transport_msg(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the upstream HTTP status, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ConfigError> for HarnessError {
    fn from(value: ConfigError) -> Self {
        HarnessError::Config(value.to_string())
    }
}

impl From<PathError> for HarnessError {
    fn from(value: PathError) -> Self {
        HarnessError::Validation(value.to_string())
    }
}
