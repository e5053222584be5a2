//! IPC event types (server to client).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use soundwarden_core::PropertyChange;

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DefaultSinkChanged,
    DefaultSourceChanged,
    /// Exported sink paths changed
    SinksChanged,
    /// Exported source paths changed
    SourcesChanged,
    /// Exported playback stream paths changed
    SinkInputsChanged,
    /// Card or port summaries changed
    CardsChanged,
    /// A port was enabled or disabled by policy
    PortEnabledChanged,
    BluetoothModeChanged,
    /// Max UI volume, increase-volume or reduce-noise flags changed
    AudioFlagsChanged,
    /// An exported endpoint or stream changed
    ObjectChanged,
    /// Engine lifecycle state changed
    StateChanged,
}

impl EventType {
    pub const ALL: [Self; 11] = [
        Self::DefaultSinkChanged,
        Self::DefaultSourceChanged,
        Self::SinksChanged,
        Self::SourcesChanged,
        Self::SinkInputsChanged,
        Self::CardsChanged,
        Self::PortEnabledChanged,
        Self::BluetoothModeChanged,
        Self::AudioFlagsChanged,
        Self::ObjectChanged,
        Self::StateChanged,
    ];

    /// The event type a property change is published under.
    #[must_use]
    pub fn of(change: &PropertyChange) -> Self {
        match change {
            PropertyChange::DefaultSink { .. } => Self::DefaultSinkChanged,
            PropertyChange::DefaultSource { .. } => Self::DefaultSourceChanged,
            PropertyChange::Sinks { .. } => Self::SinksChanged,
            PropertyChange::Sources { .. } => Self::SourcesChanged,
            PropertyChange::SinkInputs { .. } => Self::SinkInputsChanged,
            PropertyChange::Cards => Self::CardsChanged,
            PropertyChange::PortEnabled { .. } => Self::PortEnabledChanged,
            PropertyChange::BluetoothMode { .. } => Self::BluetoothModeChanged,
            PropertyChange::AudioFlags { .. } => Self::AudioFlagsChanged,
            PropertyChange::ObjectChanged { .. } => Self::ObjectChanged,
            PropertyChange::BackendState { .. } => Self::StateChanged,
        }
    }
}

impl Event {
    /// Wrap a property change; the change itself is the event data.
    ///
    /// # Errors
    /// Returns an error if the change cannot be serialized.
    pub fn from_change(change: &PropertyChange) -> serde_json::Result<Self> {
        Ok(Self { event: EventType::of(change), data: serde_json::to_value(change)? })
    }
}
