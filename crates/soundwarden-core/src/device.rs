//! Device graph data model: cards, ports, profiles, endpoints and streams.
//!
//! These are plain snapshots as reported by the backend. Identity is the
//! backend-assigned numeric index; names are the stable keys used for policy.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::volume::ChannelVolume;

/// Signal direction of a port or endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Output (playback)
    Sink,
    /// Input (capture)
    Source,
}

impl Direction {
    /// Wire value of the sink direction.
    pub const SINK: i32 = 1;
    /// Wire value of the source direction.
    pub const SOURCE: i32 = 2;

    /// The other direction.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Sink => Self::Source,
            Self::Source => Self::Sink,
        }
    }

    /// Parse the numeric direction used on the wire.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDirection`] for anything but 1 or 2.
    pub fn from_wire(value: i32) -> Result<Self> {
        match value {
            Self::SINK => Ok(Self::Sink),
            Self::SOURCE => Ok(Self::Source),
            other => Err(Error::InvalidDirection(other)),
        }
    }

    /// Numeric direction used on the wire.
    #[must_use]
    pub fn as_wire(self) -> i32 {
        match self {
            Self::Sink => Self::SINK,
            Self::Source => Self::SOURCE,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sink => "sink",
            Self::Source => "source",
        })
    }
}

/// Backend-reported connectivity of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Unknown,
    No,
    Yes,
}

/// A port as listed on its card, with the profiles it is valid under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPort {
    pub name: String,
    pub description: String,
    pub direction: Direction,
    pub availability: Availability,
    pub priority: u32,
    /// Profiles under which this port is usable, in backend order
    pub profiles: Vec<String>,
    /// Backend port type hint ("Headphones", "Speaker", "Mic", ...)
    pub port_type: Option<String>,
}

impl CardPort {
    /// Whether the port is usable under `profile`.
    #[must_use]
    pub fn usable_under(&self, profile: &str) -> bool {
        self.profiles.iter().any(|p| p == profile)
    }
}

/// A named hardware configuration of a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProfile {
    pub name: String,
    pub description: String,
    pub priority: u32,
    pub available: bool,
}

/// A hardware audio device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardInfo {
    pub index: u32,
    pub name: String,
    pub properties: HashMap<String, String>,
    /// Profiles in backend order
    pub profiles: Vec<CardProfile>,
    pub active_profile: Option<String>,
    pub ports: Vec<CardPort>,
}

impl CardInfo {
    /// Look up a port by name and direction.
    #[must_use]
    pub fn port(&self, name: &str, direction: Direction) -> Option<&CardPort> {
        self.ports.iter().find(|p| p.name == name && p.direction == direction)
    }

    /// Look up a profile by name.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&CardProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Name of the active profile, empty if the backend reported none.
    #[must_use]
    pub fn active_profile_name(&self) -> &str {
        self.active_profile.as_deref().unwrap_or_default()
    }

    /// Whether the card is a Bluetooth device.
    #[must_use]
    pub fn is_bluetooth(&self) -> bool {
        self.name.starts_with("bluez")
            || self.properties.get("device.bus").is_some_and(|b| b == "bluetooth")
            || self.properties.get("device.api").is_some_and(|a| a == "bluez5")
    }

    /// First profile of the card, in card order, that exposes `port`.
    ///
    /// Available profiles are preferred over unavailable ones.
    #[must_use]
    pub fn first_profile_for_port(&self, port: &CardPort) -> Option<&CardProfile> {
        let mut exposing = self.profiles.iter().filter(|p| port.usable_under(&p.name));
        let first = exposing.clone().next();
        exposing.find(|p| p.available).or(first)
    }
}

/// Profiles shared by `target` and the opposite-direction port, in the
/// target port's order.
#[must_use]
pub fn common_profiles<'a>(target: &'a CardPort, opposite: Option<&CardPort>) -> Vec<&'a str> {
    let Some(opposite) = opposite else {
        return Vec::new();
    };
    target
        .profiles
        .iter()
        .filter(|p| opposite.usable_under(p))
        .map(String::as_str)
        .collect()
}

/// Whether a profile name denotes high quality Bluetooth playback
/// (`a2dp_sink`, `a2dp-sink-aac`, ...).
#[must_use]
pub fn is_a2dp_sink_profile(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("a2dp_sink") || lower.starts_with("a2dp-sink")
}

/// A port as listed on a sink or source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointPort {
    pub name: String,
    pub description: String,
    pub availability: Availability,
    pub priority: u32,
}

/// Capability class of an endpoint, computed once when it is mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EndpointKind {
    /// Backed by a card port
    Physical,
    /// Delegates to a physical master device
    VirtualMaster { master: String },
    /// Echo/loopback tap of a sink
    Monitor,
}

impl EndpointKind {
    /// Property naming the master device of a virtual endpoint.
    pub const MASTER_DEVICE_PROP: &'static str = "device.master_device";

    /// Classify an endpoint from its backend description.
    #[must_use]
    pub fn classify(info: &EndpointInfo) -> Self {
        if info.direction == Direction::Source
            && (info.monitor_of.is_some() || info.name.ends_with(".monitor"))
        {
            return Self::Monitor;
        }
        match info.properties.get(Self::MASTER_DEVICE_PROP) {
            Some(master) if !master.is_empty() => Self::VirtualMaster { master: master.clone() },
            _ => Self::Physical,
        }
    }
}

/// A live sink or source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub index: u32,
    pub name: String,
    pub description: String,
    pub direction: Direction,
    /// Owning card, if any
    pub card: Option<u32>,
    pub ports: Vec<EndpointPort>,
    pub active_port: Option<String>,
    pub volume: ChannelVolume,
    pub mute: bool,
    /// For monitor sources: the sink being monitored
    pub monitor_of: Option<u32>,
    pub properties: HashMap<String, String>,
}

impl EndpointInfo {
    /// The active port entry.
    #[must_use]
    pub fn active_port(&self) -> Option<&EndpointPort> {
        let name = self.active_port.as_deref()?;
        self.ports.iter().find(|p| p.name == name)
    }

    /// Name of the active port, empty if none.
    #[must_use]
    pub fn active_port_name(&self) -> &str {
        self.active_port.as_deref().unwrap_or_default()
    }

    /// Whether the endpoint lists a port named `name`.
    #[must_use]
    pub fn has_port(&self, name: &str) -> bool {
        self.ports.iter().any(|p| p.name == name)
    }
}

/// A playback stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkInputInfo {
    pub index: u32,
    pub sink: u32,
    pub name: String,
}

/// Server-wide information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: String,
    pub default_sink_name: String,
    pub default_source_name: String,
}

impl ServerInfo {
    /// Name of the default endpoint for `direction`.
    #[must_use]
    pub fn default_name(&self, direction: Direction) -> &str {
        match direction {
            Direction::Sink => &self.default_sink_name,
            Direction::Source => &self.default_source_name,
        }
    }
}
