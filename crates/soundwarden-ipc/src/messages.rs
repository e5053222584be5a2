//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use soundwarden_core::{Command, Direction, ErrorKind};

use crate::events::EventType;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

impl Response {
    #[must_use]
    pub fn ok(id: u64, value: Value) -> Self {
        Self { id, result: Ok(value) }
    }

    #[must_use]
    pub fn err(id: u64, error: ErrorInfo) -> Self {
        Self { id, result: Err(error) }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code, see [`error_code`]
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Malformed request line or arguments.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(error_code(ErrorKind::InvalidArgument), message)
    }
}

impl From<&soundwarden_core::Error> for ErrorInfo {
    fn from(e: &soundwarden_core::Error) -> Self {
        Self::new(error_code(e.kind()), e.to_string())
    }
}

/// Numeric code reported for each error kind.
#[must_use]
pub fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::InvalidArgument => 400,
        ErrorKind::PolicyRejected => 403,
        ErrorKind::NotFound => 404,
        ErrorKind::Internal => 500,
        ErrorKind::BackendRejected => 502,
        ErrorKind::Unavailable => 503,
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // Queries
    /// Full exported property snapshot
    GetState,
    /// Card and port summaries
    GetCards {
        /// Hide ports reported unavailable
        #[serde(default)]
        available_only: bool,
    },
    /// One exported endpoint or stream by object path
    GetObject { path: String },
    /// Whether a card's port is enabled by policy
    IsPortEnabled { card: u32, port: String },
    /// Current Bluetooth audio mode and the available options
    GetBluetoothAudioMode,
    /// Internal counters
    GetDiagnostics,

    // Port control
    SetPort { card: u32, port: String, direction: Direction },
    SetPortEnabled { card: u32, port: String, enabled: bool },
    SetBluetoothAudioMode { mode: String },
    /// Restore all volumes to defaults
    Reset,

    // Default endpoint control
    SetMute { direction: Direction, muted: bool },
    SetVolume { direction: Direction, volume: f64 },
    SetBalance { direction: Direction, balance: f64 },
    SetIncreaseVolume { enabled: bool },
    SetReduceNoise { enabled: bool },

    // Subscriptions
    /// Subscribe to event types; an empty list means all
    Subscribe { events: Vec<EventType> },
    /// Unsubscribe from event types
    Unsubscribe { events: Vec<EventType> },

    // System
    /// Request graceful shutdown
    Shutdown,
    /// Force a full reconciliation against the audio server
    Reconcile,
}

impl Method {
    /// The engine command this method maps to, if it is one.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Some(match self.clone() {
            Self::SetPort { card, port, direction } => Command::SetPort { card, port, direction },
            Self::SetPortEnabled { card, port, enabled } => Command::SetPortEnabled { card, port, enabled },
            Self::SetBluetoothAudioMode { mode } => Command::SetBluetoothAudioMode { mode },
            Self::Reset => Command::Reset,
            Self::SetMute { direction, muted } => Command::SetMute { direction, muted },
            Self::SetVolume { direction, volume } => Command::SetVolume { direction, volume },
            Self::SetBalance { direction, balance } => Command::SetBalance { direction, balance },
            Self::SetIncreaseVolume { enabled } => Command::SetIncreaseVolume { enabled },
            Self::SetReduceNoise { enabled } => Command::SetReduceNoise { enabled },
            Self::Reconcile => Command::Reconcile,
            _ => return None,
        })
    }
}
