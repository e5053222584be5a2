//! Scripted in-memory backend and fixtures for engine tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::device::{
    Availability, CardInfo, CardPort, CardProfile, Direction, EndpointInfo, EndpointPort, ServerInfo,
    SinkInputInfo,
};
use crate::engine::{AudioEngine, EngineConfig};
use crate::error::{Error, Result};
use crate::store::MemoryStore;
use crate::volume::ChannelVolume;

/// A command the engine issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetCardProfile(u32, String),
    SetPort(Direction, u32, String),
    SetDefault(Direction, String),
    SetVolume(Direction, u32, Vec<u32>),
    SetMute(Direction, u32, bool),
    MoveSinkInputs(Vec<u32>, u32),
}

#[derive(Default)]
struct World {
    server: ServerInfo,
    cards: Vec<CardInfo>,
    sinks: Vec<EndpointInfo>,
    sources: Vec<EndpointInfo>,
    inputs: Vec<SinkInputInfo>,
    next_index: u32,
    reject_profiles: bool,
}

impl World {
    fn endpoints_mut(&mut self, direction: Direction) -> &mut Vec<EndpointInfo> {
        match direction {
            Direction::Sink => &mut self.sinks,
            Direction::Source => &mut self.sources,
        }
    }

    /// Recreate a card's endpoints for its active profile.
    fn respawn(&mut self, card_index: u32) {
        let Some(card) = self.cards.iter().find(|c| c.index == card_index).cloned() else {
            return;
        };
        let profile = card.active_profile_name().to_string();
        for direction in [Direction::Sink, Direction::Source] {
            let ports: Vec<&CardPort> = card
                .ports
                .iter()
                .filter(|p| p.direction == direction && p.usable_under(&profile))
                .collect();
            let name = format!("{}.{}.{}", prefix(direction), card.name, profile);

            let existing = self.endpoints_mut(direction).iter().position(|e| e.card == Some(card_index));
            let mut was_default = false;
            if let Some(pos) = existing {
                if self.endpoints_mut(direction)[pos].name == name && !ports.is_empty() {
                    let e = &mut self.endpoints_mut(direction)[pos];
                    e.ports = ports.iter().map(|p| to_endpoint_port(p)).collect();
                    continue;
                }
                let removed = self.endpoints_mut(direction).remove(pos);
                was_default = self.server.default_name(direction) == removed.name;
            }
            if was_default {
                // The server moves its default along with the card.
                let next = if ports.is_empty() { String::new() } else { name.clone() };
                match direction {
                    Direction::Sink => self.server.default_sink_name = next,
                    Direction::Source => self.server.default_source_name = next,
                }
            }
            if ports.is_empty() {
                continue;
            }

            let active = ports
                .iter()
                .filter(|p| p.availability != Availability::No)
                .max_by_key(|p| p.priority)
                .or_else(|| ports.first())
                .map(|p| p.name.clone());
            let index = self.next_index;
            self.next_index += 1;
            let mut info = endpoint(direction, index, &name, Some(card_index), &[], "");
            info.ports = ports.iter().map(|p| to_endpoint_port(p)).collect();
            info.active_port = active;
            self.endpoints_mut(direction).push(info);
        }
    }
}

fn prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Sink => "output",
        Direction::Source => "input",
    }
}

fn to_endpoint_port(p: &CardPort) -> EndpointPort {
    EndpointPort {
        name: p.name.clone(),
        description: p.description.clone(),
        availability: p.availability,
        priority: p.priority,
    }
}

/// Backend whose world is scripted by the test and mutated by commands.
pub struct FakeBackend {
    world: Mutex<World>,
    calls: Mutex<Vec<Call>>,
    profile_delay: Mutex<Option<Duration>>,
    profile_switches_running: AtomicUsize,
    profile_switches_peak: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            world: Mutex::new(World { next_index: 100, ..World::default() }),
            calls: Mutex::new(Vec::new()),
            profile_delay: Mutex::new(None),
            profile_switches_running: AtomicUsize::new(0),
            profile_switches_peak: AtomicUsize::new(0),
        }
    }

    /// Add a card and spawn the endpoints its active profile exposes.
    pub fn plug_card(&self, card: CardInfo) {
        let mut world = self.world.lock();
        let index = card.index;
        world.cards.retain(|c| c.index != index);
        world.cards.push(card);
        world.respawn(index);
    }

    /// Remove a card and its endpoints.
    pub fn unplug_card(&self, index: u32) {
        let mut world = self.world.lock();
        world.cards.retain(|c| c.index != index);
        world.sinks.retain(|e| e.card != Some(index));
        world.sources.retain(|e| e.card != Some(index));
    }

    pub fn add_endpoint(&self, info: EndpointInfo) {
        let mut world = self.world.lock();
        let direction = info.direction;
        world.endpoints_mut(direction).push(info);
    }

    pub fn add_sink_input(&self, index: u32, sink: u32) {
        self.world.lock().inputs.push(SinkInputInfo { index, sink, name: format!("stream-{index}") });
    }

    /// Change a port's availability on its card and endpoint.
    pub fn set_availability(&self, card: u32, port: &str, direction: Direction, availability: Availability) {
        let mut world = self.world.lock();
        if let Some(p) = world
            .cards
            .iter_mut()
            .filter(|c| c.index == card)
            .flat_map(|c| c.ports.iter_mut())
            .find(|p| p.name == port && p.direction == direction)
        {
            p.availability = availability;
        }
        for e in world.endpoints_mut(direction).iter_mut().filter(|e| e.card == Some(card)) {
            for p in e.ports.iter_mut().filter(|p| p.name == port) {
                p.availability = availability;
            }
        }
    }

    pub fn set_server_default(&self, direction: Direction, name: &str) {
        let mut world = self.world.lock();
        match direction {
            Direction::Sink => name.clone_into(&mut world.server.default_sink_name),
            Direction::Source => name.clone_into(&mut world.server.default_source_name),
        }
    }

    pub fn reject_profile_switches(&self, reject: bool) {
        self.world.lock().reject_profiles = reject;
    }

    /// Make every profile switch take `delay` before it lands.
    pub fn slow_profile_switches(&self, delay: Duration) {
        *self.profile_delay.lock() = Some(delay);
    }

    /// Most profile switches ever observed in flight at once.
    pub fn peak_concurrent_profile_switches(&self) -> usize {
        self.profile_switches_peak.load(Ordering::SeqCst)
    }

    /// The live endpoint of `card` in `direction`.
    pub fn endpoint_of_card(&self, direction: Direction, card: u32) -> Option<EndpointInfo> {
        let mut world = self.world.lock();
        world.endpoints_mut(direction).iter().find(|e| e.card == Some(card)).cloned()
    }

    pub fn card(&self, index: u32) -> Option<CardInfo> {
        self.world.lock().cards.iter().find(|c| c.index == index).cloned()
    }

    pub fn default_name(&self, direction: Direction) -> String {
        self.world.lock().server.default_name(direction).to_string()
    }

    pub fn inputs(&self) -> Vec<SinkInputInfo> {
        self.world.lock().inputs.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn switch_profile(&self, card: u32, profile: &str) -> Result<()> {
        let mut world = self.world.lock();
        if world.reject_profiles {
            return Err(Error::backend("set-card-profile", "Operation failed"));
        }
        let c = world
            .cards
            .iter_mut()
            .find(|c| c.index == card)
            .ok_or_else(|| Error::backend("set-card-profile", "No such entity"))?;
        if c.profile(profile).is_none() {
            return Err(Error::backend("set-card-profile", "No such entity"));
        }
        c.active_profile = Some(profile.to_string());
        world.respawn(card);
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn with_endpoint(
        &self,
        direction: Direction,
        index: u32,
        operation: &str,
        f: impl FnOnce(&mut EndpointInfo),
    ) -> Result<()> {
        let mut world = self.world.lock();
        let e = world
            .endpoints_mut(direction)
            .iter_mut()
            .find(|e| e.index == index)
            .ok_or_else(|| Error::backend(operation, format!("no {direction} #{index}")))?;
        f(e);
        Ok(())
    }
}

impl Backend for FakeBackend {
    fn server_info(&self) -> Result<ServerInfo> {
        Ok(self.world.lock().server.clone())
    }

    fn cards(&self) -> Result<Vec<CardInfo>> {
        Ok(self.world.lock().cards.clone())
    }

    fn sinks(&self) -> Result<Vec<EndpointInfo>> {
        Ok(self.world.lock().sinks.clone())
    }

    fn sources(&self) -> Result<Vec<EndpointInfo>> {
        Ok(self.world.lock().sources.clone())
    }

    fn sink_inputs(&self) -> Result<Vec<SinkInputInfo>> {
        Ok(self.world.lock().inputs.clone())
    }

    fn set_card_profile(&self, card: u32, profile: &str) -> Result<()> {
        self.record(Call::SetCardProfile(card, profile.to_string()));
        let running = self.profile_switches_running.fetch_add(1, Ordering::SeqCst) + 1;
        self.profile_switches_peak.fetch_max(running, Ordering::SeqCst);
        let delay = *self.profile_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let result = self.switch_profile(card, profile);
        self.profile_switches_running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn set_port(&self, direction: Direction, index: u32, port: &str) -> Result<()> {
        self.record(Call::SetPort(direction, index, port.to_string()));
        let mut missing = false;
        self.with_endpoint(direction, index, "set-port", |e| {
            if e.has_port(port) {
                e.active_port = Some(port.to_string());
            } else {
                missing = true;
            }
        })?;
        if missing {
            return Err(Error::backend("set-port", "No such entity"));
        }
        Ok(())
    }

    fn set_default(&self, direction: Direction, name: &str) -> Result<()> {
        self.record(Call::SetDefault(direction, name.to_string()));
        self.set_server_default(direction, name);
        Ok(())
    }

    fn set_volume(&self, direction: Direction, index: u32, volume: &ChannelVolume) -> Result<()> {
        self.record(Call::SetVolume(direction, index, volume.to_raw()));
        self.with_endpoint(direction, index, "set-volume", |e| e.volume = volume.clone())
    }

    fn set_mute(&self, direction: Direction, index: u32, muted: bool) -> Result<()> {
        self.record(Call::SetMute(direction, index, muted));
        self.with_endpoint(direction, index, "set-mute", |e| e.mute = muted)
    }

    fn move_sink_inputs(&self, inputs: &[u32], sink: u32) -> Result<()> {
        self.record(Call::MoveSinkInputs(inputs.to_vec(), sink));
        let mut world = self.world.lock();
        for input in world.inputs.iter_mut().filter(|i| inputs.contains(&i.index)) {
            input.sink = sink;
        }
        Ok(())
    }
}

pub fn profile(name: &str, available: bool) -> CardProfile {
    CardProfile { name: name.into(), description: name.into(), priority: 0, available }
}

pub fn card_port(
    name: &str,
    direction: Direction,
    availability: Availability,
    priority: u32,
    profiles: &[&str],
) -> CardPort {
    CardPort {
        name: name.into(),
        description: name.into(),
        direction,
        availability,
        priority,
        profiles: profiles.iter().map(|p| (*p).to_string()).collect(),
        port_type: None,
    }
}

pub fn card(index: u32, name: &str, profiles: Vec<CardProfile>, active: &str, ports: Vec<CardPort>) -> CardInfo {
    CardInfo {
        index,
        name: name.into(),
        properties: HashMap::new(),
        profiles,
        active_profile: Some(active.into()),
        ports,
    }
}

pub fn endpoint(
    direction: Direction,
    index: u32,
    name: &str,
    card: Option<u32>,
    ports: &[&str],
    active: &str,
) -> EndpointInfo {
    EndpointInfo {
        index,
        name: name.into(),
        description: name.into(),
        direction,
        card,
        ports: ports
            .iter()
            .map(|p| EndpointPort {
                name: (*p).to_string(),
                description: (*p).to_string(),
                availability: Availability::Yes,
                priority: 0,
            })
            .collect(),
        active_port: (!active.is_empty()).then(|| active.to_string()),
        volume: ChannelVolume::stereo(1.0),
        mute: false,
        monitor_of: None,
        properties: HashMap::new(),
    }
}

/// Laptop card: headphones and speaker on one output profile, one mic.
pub fn laptop_card(index: u32) -> CardInfo {
    card(
        index,
        "alsa_card.pci-0000_00_1f.3",
        vec![profile("output:analog-stereo+input:analog-stereo", true), profile("off", true)],
        "output:analog-stereo+input:analog-stereo",
        vec![
            card_port(
                "analog-output-speaker",
                Direction::Sink,
                Availability::Yes,
                10000,
                &["output:analog-stereo+input:analog-stereo"],
            ),
            card_port(
                "analog-output-headphones",
                Direction::Sink,
                Availability::Yes,
                9900,
                &["output:analog-stereo+input:analog-stereo"],
            ),
            card_port(
                "analog-input-internal-mic",
                Direction::Source,
                Availability::Unknown,
                8900,
                &["output:analog-stereo+input:analog-stereo"],
            ),
        ],
    )
}

/// Bluetooth headset with a2dp and headset profiles.
pub fn bluetooth_card(index: u32) -> CardInfo {
    card(
        index,
        "bluez_card.00_11_22_33_44_55",
        vec![profile("headset_head_unit", true), profile("a2dp_sink", true), profile("off", true)],
        "off",
        vec![
            card_port(
                "headset-output",
                Direction::Sink,
                Availability::Yes,
                0,
                &["headset_head_unit", "a2dp_sink"],
            ),
            card_port("headset-input", Direction::Source, Availability::Yes, 0, &["headset_head_unit"]),
        ],
    )
}

/// Engine over `fake` with a fresh in-memory store.
pub fn engine_with(fake: &Arc<FakeBackend>) -> AudioEngine {
    AudioEngine::new(fake.clone(), Arc::new(MemoryStore::new()), EngineConfig::default())
}

/// Engine over `fake` and `store`, already initialized.
pub fn live_engine(fake: &Arc<FakeBackend>, store: Arc<MemoryStore>) -> AudioEngine {
    let engine = AudioEngine::new(fake.clone(), store, EngineConfig::default());
    engine.initialize();
    engine
}
