//! PipeWire error types.

use thiserror::Error;

/// PipeWire error type.
#[derive(Debug, Error)]
pub enum PwError {
    #[error("PipeWire connection failed: {0}")]
    ConnectionFailed(String),

    #[error("MainLoop error: {0}")]
    MainLoopError(String),

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: std::time::Duration },

    #[error("{command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PwError {
    /// Short name of the failed operation.
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::ConnectionFailed(_) => "connect",
            Self::MainLoopError(_) => "main loop",
            Self::Spawn { command, .. } | Self::Timeout { command, .. } | Self::CommandFailed { command, .. } => {
                command
            }
            Self::Decode { what, .. } => what,
        }
    }
}

impl From<PwError> for soundwarden_core::Error {
    fn from(e: PwError) -> Self {
        let operation = e.operation().to_string();
        Self::backend(operation, e.to_string())
    }
}

/// Result type for PipeWire operations.
pub type PwResult<T> = Result<T, PwError>;
