//! SoundWarden PipeWire - the audio server binding.
//!
//! This crate implements the engine's backend seam against a PipeWire
//! session running its pulse-compatible server:
//! - Snapshot queries and imperative commands through `pactl`
//! - Change events from `pactl subscribe`
//! - Server up/down from a native PipeWire connection

pub mod backend;
pub mod error;
pub mod json;
pub mod pactl;
pub mod subscribe;
pub mod watchdog;

pub use backend::{BackendConfig, BackendStreams, PipeWireBackend};
pub use error::{PwError, PwResult};
pub use pactl::Pactl;
