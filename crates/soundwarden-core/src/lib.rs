//! SoundWarden Core - device graph mirror and port/profile policy.
//!
//! This crate keeps an in-memory mirror of the audio server's cards, sinks,
//! sources and playback streams in sync with backend events, and applies
//! persisted per-port policy and priority-based port selection on top of it.
//! It performs no I/O of its own: the audio server is reached through the
//! [`Backend`] trait and persistence through [`PolicyStore`].

pub mod backend;
pub mod bluetooth;
pub mod command;
pub mod controller;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod graph;
pub mod keeper;
pub mod mirror;
pub mod priority;
pub mod properties;
pub mod recovery;
pub mod state;
pub mod store;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{Backend, BackendEvent, EventKind, Facility, ServerState};
pub use command::Command;
pub use device::{Availability, CardInfo, Direction, EndpointInfo, EndpointKind, ServerInfo, SinkInputInfo};
pub use dispatch::Dispatcher;
pub use engine::{AudioEngine, EngineConfig};
pub use error::{Error, ErrorKind, Result};
pub use keeper::VolumeDefaults;
pub use priority::PortType;
pub use properties::{Properties, PropertyChange};
pub use state::{Diagnostics, EngineState};
pub use store::{MemoryStore, MuteConfig, PolicyStore, PortConfig, PortKey};
pub use volume::ChannelVolume;
