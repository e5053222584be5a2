//! Error types for SoundWarden core.

use thiserror::Error;

use crate::device::Direction;

/// Core error type for SoundWarden operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("card #{card} port {port:?} is disabled")]
    PolicyRejected { card: u32, port: String },

    #[error("card #{0} not found")]
    CardNotFound(u32),

    #[error("card #{card} has no {direction} port {port:?}")]
    PortNotFound { card: u32, port: String, direction: Direction },

    #[error("card #{card} has no port {port:?}")]
    UnknownPort { card: u32, port: String },

    #[error("card #{card}: no usable profile for port {port:?}")]
    ProfileNotFound { card: u32, port: String },

    #[error("no live {direction} for card #{card} port {port:?}")]
    EndpointNotFound { card: u32, port: String, direction: Direction },

    #[error("no default {0}")]
    NoDefault(Direction),

    #[error("backend {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("invalid port direction: {0}")]
    InvalidDirection(i32),

    #[error("current card {0} is not a bluetooth audio device")]
    NotBluetooth(String),

    #[error("{card} cannot support {mode} mode")]
    UnsupportedMode { card: String, mode: String },

    #[error("policy store error: {0}")]
    Store(String),

    #[error("audio backend is not connected")]
    NotReady,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of [`Error`], used to report failures to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target disabled by persisted policy
    PolicyRejected,
    /// Referenced card, port, profile or endpoint is not in the mirror
    NotFound,
    /// Malformed request
    InvalidArgument,
    /// Imperative command failed at the backend
    BackendRejected,
    /// Backend disconnected
    Unavailable,
    /// Anything else
    Internal,
}

impl Error {
    /// Build a backend failure for `operation`.
    pub fn backend(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend { operation: operation.into(), reason: reason.to_string() }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PolicyRejected { .. } => ErrorKind::PolicyRejected,
            Self::CardNotFound(_)
            | Self::PortNotFound { .. }
            | Self::UnknownPort { .. }
            | Self::ProfileNotFound { .. }
            | Self::EndpointNotFound { .. }
            | Self::NoDefault(_) => ErrorKind::NotFound,
            Self::InvalidDirection(_) | Self::NotBluetooth(_) | Self::UnsupportedMode { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Backend { .. } => ErrorKind::BackendRejected,
            Self::NotReady => ErrorKind::Unavailable,
            Self::Store(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for SoundWarden core operations.
pub type Result<T> = std::result::Result<T, Error>;
