//! The seam between the engine and the audio server.
//!
//! Calls are synchronous and short; the engine invokes them from blocking
//! worker threads, never from an async task.

use serde::{Deserialize, Serialize};

use crate::device::{CardInfo, Direction, EndpointInfo, ServerInfo, SinkInputInfo};
use crate::error::Result;
use crate::volume::ChannelVolume;

/// Which collection a backend event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    Card,
    Sink,
    Source,
    SinkInput,
    Server,
}

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    New,
    Change,
    Remove,
}

/// A typed change notification from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEvent {
    pub facility: Facility,
    pub kind: EventKind,
    pub index: u32,
}

impl BackendEvent {
    #[must_use]
    pub fn new(facility: Facility, kind: EventKind, index: u32) -> Self {
        Self { facility, kind, index }
    }
}

/// Server connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Connected,
    Disconnected,
}

/// Snapshot queries and imperative commands against the audio server.
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send + Sync {
    /// Default device names and server identity.
    fn server_info(&self) -> Result<ServerInfo>;

    fn cards(&self) -> Result<Vec<CardInfo>>;

    fn sinks(&self) -> Result<Vec<EndpointInfo>>;

    fn sources(&self) -> Result<Vec<EndpointInfo>>;

    fn sink_inputs(&self) -> Result<Vec<SinkInputInfo>>;

    /// Endpoints of one direction.
    fn endpoints(&self, direction: Direction) -> Result<Vec<EndpointInfo>> {
        match direction {
            Direction::Sink => self.sinks(),
            Direction::Source => self.sources(),
        }
    }

    /// Single-item fetch by index.
    fn endpoint_by_index(&self, direction: Direction, index: u32) -> Result<Option<EndpointInfo>> {
        Ok(self.endpoints(direction)?.into_iter().find(|e| e.index == index))
    }

    /// Single-item fetch by name.
    fn endpoint_by_name(&self, direction: Direction, name: &str) -> Result<Option<EndpointInfo>> {
        Ok(self.endpoints(direction)?.into_iter().find(|e| e.name == name))
    }

    fn card_by_index(&self, index: u32) -> Result<Option<CardInfo>> {
        Ok(self.cards()?.into_iter().find(|c| c.index == index))
    }

    fn sink_input_by_index(&self, index: u32) -> Result<Option<SinkInputInfo>> {
        Ok(self.sink_inputs()?.into_iter().find(|s| s.index == index))
    }

    fn set_card_profile(&self, card: u32, profile: &str) -> Result<()>;

    /// Activate `port` on the sink or source at `index`.
    fn set_port(&self, direction: Direction, index: u32, port: &str) -> Result<()>;

    fn set_default(&self, direction: Direction, name: &str) -> Result<()>;

    fn set_volume(&self, direction: Direction, index: u32, volume: &ChannelVolume) -> Result<()>;

    fn set_mute(&self, direction: Direction, index: u32, muted: bool) -> Result<()>;

    /// Move playback streams onto the sink at `sink`.
    fn move_sink_inputs(&self, inputs: &[u32], sink: u32) -> Result<()>;
}
