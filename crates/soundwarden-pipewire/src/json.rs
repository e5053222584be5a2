//! Decoding of `pactl --format=json` output.
//!
//! Maps keep the server's order (`serde_json` is built with
//! `preserve_order`), which the profile search relies on.

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use soundwarden_core::device::{CardPort, CardProfile, EndpointPort};
use soundwarden_core::volume::ChannelPosition;
use soundwarden_core::{Availability, CardInfo, ChannelVolume, Direction, EndpointInfo, ServerInfo, SinkInputInfo};

use crate::error::{PwError, PwResult};

/// Property carrying the card index of a sink or source on PipeWire.
pub const DEVICE_ID_PROP: &str = "device.id";

/// Map a pactl availability string.
#[must_use]
pub fn availability(value: &str) -> Availability {
    match value {
        "available" => Availability::Yes,
        "not available" => Availability::No,
        _ => Availability::Unknown,
    }
}

/// Card port listings carry no direction; derive it from the port name and type.
#[must_use]
pub fn port_direction(name: &str, port_type: Option<&str>) -> Direction {
    let lower = name.to_ascii_lowercase();
    if lower.contains("input") || lower.contains("mic") || port_type == Some("Mic") {
        Direction::Source
    } else {
        Direction::Sink
    }
}

#[derive(Debug, Deserialize)]
struct RawServer {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    default_sink_name: String,
    #[serde(default)]
    default_source_name: String,
}

#[derive(Debug, Deserialize)]
struct RawCard {
    index: u32,
    name: String,
    #[serde(default)]
    properties: HashMap<String, Value>,
    #[serde(default)]
    profiles: Map<String, Value>,
    #[serde(default)]
    active_profile: Option<String>,
    #[serde(default)]
    ports: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: u32,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Deserialize)]
struct RawCardPort {
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    port_type: Option<String>,
    #[serde(default)]
    priority: u32,
    #[serde(default)]
    availability: String,
    #[serde(default)]
    profiles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEndpointPort {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: u32,
    #[serde(default)]
    availability: String,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    value: u32,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    index: u32,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    volume: Map<String, Value>,
    #[serde(default)]
    properties: HashMap<String, Value>,
    #[serde(default)]
    ports: Vec<RawEndpointPort>,
    #[serde(default)]
    active_port: Option<String>,
    #[serde(default)]
    monitor_of_sink: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSinkInput {
    index: u32,
    sink: u32,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

fn decode<T: DeserializeOwned>(what: &str, value: Value) -> PwResult<T> {
    serde_json::from_value(value).map_err(|source| PwError::Decode { what: what.to_string(), source })
}

fn parse<T: DeserializeOwned>(what: &str, json: &str) -> PwResult<T> {
    serde_json::from_str(json).map_err(|source| PwError::Decode { what: what.to_string(), source })
}

/// Properties are mostly strings; numbers and booleans are stringified.
fn flatten(properties: HashMap<String, Value>) -> HashMap<String, String> {
    properties
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}

fn none_if_unset(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "n/a")
}

pub fn decode_server(json: &str) -> PwResult<ServerInfo> {
    let raw: RawServer = parse("server info", json)?;
    Ok(ServerInfo {
        server_name: raw.server_name,
        default_sink_name: raw.default_sink_name,
        default_source_name: raw.default_source_name,
    })
}

pub fn decode_cards(json: &str) -> PwResult<Vec<CardInfo>> {
    let raw: Vec<RawCard> = parse("cards", json)?;
    raw.into_iter().map(card).collect()
}

fn card(raw: RawCard) -> PwResult<CardInfo> {
    let profiles = raw
        .profiles
        .into_iter()
        .map(|(name, value)| {
            let p: RawProfile = decode("card profile", value)?;
            Ok(CardProfile { name, description: p.description, priority: p.priority, available: p.available })
        })
        .collect::<PwResult<Vec<_>>>()?;

    let ports = raw
        .ports
        .into_iter()
        .map(|(name, value)| {
            let p: RawCardPort = decode("card port", value)?;
            let port_type = p.port_type.filter(|t| t != "Unknown");
            Ok(CardPort {
                direction: port_direction(&name, port_type.as_deref()),
                name,
                description: p.description,
                availability: availability(&p.availability),
                priority: p.priority,
                profiles: p.profiles,
                port_type,
            })
        })
        .collect::<PwResult<Vec<_>>>()?;

    Ok(CardInfo {
        index: raw.index,
        name: raw.name,
        properties: flatten(raw.properties),
        profiles,
        active_profile: none_if_unset(raw.active_profile),
        ports,
    })
}

/// Decode a sink or source list. `sink_index` resolves the sink a monitor
/// source belongs to.
pub fn decode_endpoints(
    json: &str,
    direction: Direction,
    sink_index: impl Fn(&str) -> Option<u32>,
) -> PwResult<Vec<EndpointInfo>> {
    let what = if direction == Direction::Sink { "sinks" } else { "sources" };
    let raw: Vec<RawEndpoint> = parse(what, json)?;
    raw.into_iter().map(|e| endpoint(e, direction, &sink_index)).collect()
}

fn endpoint(raw: RawEndpoint, direction: Direction, sink_index: &impl Fn(&str) -> Option<u32>) -> PwResult<EndpointInfo> {
    let channels = raw
        .volume
        .into_iter()
        .map(|(position, value)| {
            let c: RawChannel = decode("channel volume", value)?;
            Ok((ChannelPosition::from_name(&position), c.value))
        })
        .collect::<PwResult<Vec<_>>>()?;
    let volume = if channels.is_empty() { ChannelVolume::default() } else { ChannelVolume::from_raw(channels) };

    let properties = flatten(raw.properties);
    let card = properties.get(DEVICE_ID_PROP).and_then(|id| id.parse().ok());
    let monitor_of = none_if_unset(raw.monitor_of_sink).and_then(|sink| sink_index(&sink));

    Ok(EndpointInfo {
        index: raw.index,
        name: raw.name,
        description: raw.description,
        direction,
        card,
        ports: raw
            .ports
            .into_iter()
            .map(|p| EndpointPort {
                name: p.name,
                description: p.description,
                availability: availability(&p.availability),
                priority: p.priority,
            })
            .collect(),
        active_port: none_if_unset(raw.active_port),
        volume,
        mute: raw.mute,
        monitor_of,
        properties,
    })
}

pub fn decode_sink_inputs(json: &str) -> PwResult<Vec<SinkInputInfo>> {
    let raw: Vec<RawSinkInput> = parse("sink inputs", json)?;
    Ok(raw
        .into_iter()
        .map(|s| {
            let properties = flatten(s.properties);
            let name = properties
                .get("application.name")
                .or_else(|| properties.get("media.name"))
                .cloned()
                .unwrap_or_default();
            SinkInputInfo { index: s.index, sink: s.sink, name }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const CARDS: &str = r#"[
      {
        "index": 47,
        "name": "alsa_card.pci-0000_00_1f.3",
        "driver": "alsa",
        "owner_module": null,
        "properties": { "device.bus": "pci", "device.api": "alsa", "api.alsa.card": "0" },
        "profiles": {
          "off": { "description": "Off", "sinks": 0, "sources": 0, "priority": 0, "available": true },
          "output:analog-stereo+input:analog-stereo": {
            "description": "Analog Stereo Duplex", "sinks": 1, "sources": 1, "priority": 6565, "available": true
          },
          "output:hdmi-stereo": { "description": "Digital Stereo (HDMI)", "sinks": 1, "sources": 0, "priority": 5900, "available": false }
        },
        "active_profile": "output:analog-stereo+input:analog-stereo",
        "ports": {
          "analog-input-internal-mic": {
            "description": "Internal Microphone", "type": "Mic", "priority": 8900,
            "latency_offset": "0 usec", "availability_group": "Legacy 1",
            "availability": "availability unknown", "properties": {},
            "profiles": ["output:analog-stereo+input:analog-stereo"]
          },
          "analog-output-speaker": {
            "description": "Speakers", "type": "Speaker", "priority": 10000,
            "latency_offset": "0 usec", "availability": "available", "properties": {},
            "profiles": ["output:analog-stereo+input:analog-stereo"]
          },
          "analog-output-headphones": {
            "description": "Headphones", "type": "Headphones", "priority": 9900,
            "latency_offset": "0 usec", "availability": "not available", "properties": {},
            "profiles": ["output:analog-stereo+input:analog-stereo"]
          }
        }
      }
    ]"#;

    const SINKS: &str = r#"[
      {
        "index": 52,
        "state": "SUSPENDED",
        "name": "alsa_output.pci-0000_00_1f.3.analog-stereo",
        "description": "Built-in Audio Analog Stereo",
        "driver": "PipeWire",
        "channel_map": "front-left,front-right",
        "mute": false,
        "volume": {
          "front-left": { "value": 32768, "value_percent": "50%", "db": "-18.06 dB" },
          "front-right": { "value": 65536, "value_percent": "100%", "db": "0.00 dB" }
        },
        "balance": 0.5,
        "monitor_source": "alsa_output.pci-0000_00_1f.3.analog-stereo.monitor",
        "properties": { "device.id": "47", "node.name": "alsa_output.pci-0000_00_1f.3.analog-stereo", "object.serial": 53 },
        "ports": [
          { "name": "analog-output-speaker", "description": "Speakers", "type": "Speaker", "priority": 10000, "availability": "available" },
          { "name": "analog-output-headphones", "description": "Headphones", "type": "Headphones", "priority": 9900, "availability": "not available" }
        ],
        "active_port": "analog-output-speaker"
      },
      {
        "index": 60,
        "name": "effect_output.virtual",
        "description": "Virtual",
        "mute": true,
        "volume": { "mono": { "value": 65536 } },
        "properties": { "device.master_device": "alsa_output.pci-0000_00_1f.3.analog-stereo" },
        "ports": [],
        "active_port": null
      }
    ]"#;

    #[test]
    fn test_decode_cards_keeps_order() {
        let cards = decode_cards(CARDS).expect("Failed to decode cards");
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.index, 47);
        let names: Vec<_> = card.profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["off", "output:analog-stereo+input:analog-stereo", "output:hdmi-stereo"]);
        assert!(!card.profiles[2].available);
        assert_eq!(card.active_profile.as_deref(), Some("output:analog-stereo+input:analog-stereo"));
        assert_eq!(card.properties["api.alsa.card"], "0");

        let mic = &card.ports[0];
        assert_eq!(mic.direction, Direction::Source);
        assert_eq!(mic.availability, Availability::Unknown);
        assert_eq!(mic.port_type.as_deref(), Some("Mic"));
        let headphones = card.port("analog-output-headphones", Direction::Sink).expect("Expected a port");
        assert_eq!(headphones.availability, Availability::No);
        assert_eq!(headphones.priority, 9900);
    }

    #[test]
    fn test_decode_sinks() {
        let sinks = decode_endpoints(SINKS, Direction::Sink, |_| None).expect("Failed to decode sinks");
        let sink = &sinks[0];
        assert_eq!(sink.card, Some(47));
        assert_eq!(sink.active_port.as_deref(), Some("analog-output-speaker"));
        assert_eq!(sink.ports[1].availability, Availability::No);
        assert_eq!(sink.volume.to_raw(), vec![32768, 65536]);
        assert!((sink.volume.avg() - 1.0).abs() < 1e-9);
        assert_eq!(sink.properties["object.serial"], "53");

        let virtual_sink = &sinks[1];
        assert!(virtual_sink.mute);
        assert_eq!(virtual_sink.card, None);
        assert_eq!(virtual_sink.active_port, None);
        assert_eq!(
            soundwarden_core::EndpointKind::classify(virtual_sink),
            soundwarden_core::EndpointKind::VirtualMaster {
                master: "alsa_output.pci-0000_00_1f.3.analog-stereo".into()
            }
        );
    }

    #[test]
    fn test_decode_monitor_source() {
        let json = r#"[{
            "index": 53,
            "name": "alsa_output.pci-0000_00_1f.3.analog-stereo.monitor",
            "monitor_of_sink": "alsa_output.pci-0000_00_1f.3.analog-stereo",
            "volume": {}, "properties": {}, "ports": [], "active_port": null
        }, {
            "index": 54,
            "name": "alsa_input.pci-0000_00_1f.3.analog-stereo",
            "monitor_of_sink": "n/a",
            "volume": {}, "properties": {}, "ports": [], "active_port": null
        }]"#;
        let sources = decode_endpoints(json, Direction::Source, |name| {
            (name == "alsa_output.pci-0000_00_1f.3.analog-stereo").then_some(52)
        })
        .expect("Failed to decode sources");
        assert_eq!(sources[0].monitor_of, Some(52));
        assert_eq!(sources[1].monitor_of, None);
        assert_eq!(sources[1].volume, ChannelVolume::default());
    }

    #[test]
    fn test_decode_server_and_inputs() {
        let server = decode_server(
            r#"{"server_name": "PulseAudio (on PipeWire 1.0.5)", "default_sink_name": "a", "default_source_name": "b", "cookie": "x"}"#,
        )
        .expect("Failed to decode server");
        assert_eq!(server.default_name(Direction::Sink), "a");
        assert_eq!(server.default_name(Direction::Source), "b");

        let inputs = decode_sink_inputs(
            r#"[{"index": 9, "sink": 52, "properties": {"media.name": "Playback", "application.name": "Firefox"}},
                {"index": 10, "sink": 52, "properties": {"media.name": "Stream"}}]"#,
        )
        .expect("Failed to decode sink inputs");
        assert_eq!(inputs[0].name, "Firefox");
        assert_eq!(inputs[1].name, "Stream");
        assert_eq!(inputs[1].sink, 52);
    }

    #[test]
    fn test_decode_error_names_payload() {
        assert_matches!(decode_cards("{"), Err(PwError::Decode { what, .. }) if what == "cards");
    }

    #[test]
    fn test_port_direction() {
        assert_eq!(port_direction("headset-output", None), Direction::Sink);
        assert_eq!(port_direction("headset-input", None), Direction::Source);
        assert_eq!(port_direction("analog-input-front-mic", Some("Mic")), Direction::Source);
        assert_eq!(port_direction("hdmi-output-0", Some("HDMI")), Direction::Sink);
    }
}
