//! Exported property snapshot.
//!
//! Readers take a lock-free [`Arc`] snapshot; writers serialize on a mutex,
//! clone, modify and swap. A [`PropertyChange`] is broadcast only when a
//! write actually changed something.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::device::{Availability, Direction, EndpointKind, EndpointPort};
use crate::error::{Error, Result};
use crate::state::EngineState;

/// Root of every exported object path.
pub const PATH_PREFIX: &str = "/org/soundwarden/Audio";

/// Path meaning "no object".
pub const NO_OBJECT: &str = "/";

/// Capacity of the change broadcast channel.
const CHANGE_CAPACITY: usize = 256;

/// Path of the sink or source at `index`.
#[must_use]
pub fn endpoint_path(direction: Direction, index: u32) -> String {
    match direction {
        Direction::Sink => format!("{PATH_PREFIX}/Sink{index}"),
        Direction::Source => format!("{PATH_PREFIX}/Source{index}"),
    }
}

/// Path of the sink input at `index`.
#[must_use]
pub fn sink_input_path(index: u32) -> String {
    format!("{PATH_PREFIX}/SinkInput{index}")
}

/// A port as shown in the card summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSummary {
    pub name: String,
    pub description: String,
    pub direction: Direction,
    pub enabled: bool,
    pub availability: Availability,
    pub priority: u32,
    pub bluetooth: bool,
}

/// A card as shown in the card summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    pub id: u32,
    pub name: String,
    pub active_profile: String,
    pub ports: Vec<PortSummary>,
}

/// An exported sink or source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEndpoint {
    pub path: String,
    pub index: u32,
    pub name: String,
    pub description: String,
    pub direction: Direction,
    pub card: Option<u32>,
    pub kind: EndpointKind,
    pub ports: Vec<EndpointPort>,
    pub active_port: Option<String>,
    pub volume: f64,
    pub balance: f64,
    pub fade: f64,
    pub mute: bool,
}

/// An exported playback stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSinkInput {
    pub path: String,
    pub index: u32,
    pub name: String,
    pub sink: String,
}

/// Any exported object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ExportedObject {
    Endpoint(ExportedEndpoint),
    SinkInput(ExportedSinkInput),
}

impl ExportedObject {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Endpoint(e) => &e.path,
            Self::SinkInput(s) => &s.path,
        }
    }
}

/// The externally observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub sinks: Vec<String>,
    pub sources: Vec<String>,
    pub sink_inputs: Vec<String>,
    pub default_sink: String,
    pub default_source: String,
    pub cards: Vec<CardSummary>,
    pub cards_without_unavailable: Vec<CardSummary>,
    pub bluetooth_audio_mode: String,
    pub bluetooth_audio_mode_opts: Vec<String>,
    pub max_ui_volume: f64,
    pub increase_volume: bool,
    pub reduce_noise: bool,
    pub objects: BTreeMap<String, ExportedObject>,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            sinks: Vec::new(),
            sources: Vec::new(),
            sink_inputs: Vec::new(),
            default_sink: NO_OBJECT.to_string(),
            default_source: NO_OBJECT.to_string(),
            cards: Vec::new(),
            cards_without_unavailable: Vec::new(),
            bluetooth_audio_mode: String::new(),
            bluetooth_audio_mode_opts: Vec::new(),
            max_ui_volume: 1.0,
            increase_volume: false,
            reduce_noise: false,
            objects: BTreeMap::new(),
        }
    }
}

impl Properties {
    #[must_use]
    pub fn default_path(&self, direction: Direction) -> &str {
        match direction {
            Direction::Sink => &self.default_sink,
            Direction::Source => &self.default_source,
        }
    }

    /// Exported endpoint at `path`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<&ExportedEndpoint> {
        match self.objects.get(path) {
            Some(ExportedObject::Endpoint(e)) => Some(e),
            _ => None,
        }
    }
}

/// Notification of an actual property change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PropertyChange {
    DefaultSink { path: String },
    DefaultSource { path: String },
    Sinks { paths: Vec<String> },
    Sources { paths: Vec<String> },
    SinkInputs { paths: Vec<String> },
    Cards,
    PortEnabled { card: u32, port: String, enabled: bool },
    BluetoothMode { mode: String, opts: Vec<String> },
    AudioFlags { max_ui_volume: f64, increase_volume: bool, reduce_noise: bool },
    ObjectChanged { path: String },
    BackendState { state: EngineState },
}

/// Copy-on-write property snapshot with change notification.
pub struct PropertyStore {
    snapshot: ArcSwap<Properties>,
    write: Mutex<()>,
    tx: broadcast::Sender<PropertyChange>,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { snapshot: ArcSwap::from_pointee(Properties::default()), write: Mutex::new(()), tx }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<Properties> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChange> {
        self.tx.subscribe()
    }

    /// Broadcast a change that is not backed by a stored property.
    pub fn notify(&self, change: PropertyChange) {
        // No receivers is fine.
        let _ = self.tx.send(change);
    }

    /// Apply `f` to a copy; publish and notify if it reports any change.
    fn modify(&self, f: impl FnOnce(&mut Properties) -> Vec<PropertyChange>) -> bool {
        let _guard = self.write.lock();
        let mut next = Properties::clone(&self.snapshot.load());
        let changes = f(&mut next);
        if changes.is_empty() {
            return false;
        }
        self.snapshot.store(Arc::new(next));
        for change in changes {
            self.notify(change);
        }
        true
    }

    /// Export a new object.
    ///
    /// # Errors
    /// Fails if `object`'s path is already exported.
    pub fn export(&self, object: ExportedObject) -> Result<()> {
        let path = object.path().to_string();
        let mut duplicate = false;
        self.modify(|p| {
            if p.objects.contains_key(&path) {
                duplicate = true;
                return Vec::new();
            }
            p.objects.insert(path.clone(), object);
            vec![relist(p)]
        });
        if duplicate {
            return Err(Error::Store(format!("object {path} is already exported")));
        }
        Ok(())
    }

    /// Replace an exported object; a no-op if nothing differs.
    pub fn update_object(&self, object: ExportedObject) -> bool {
        let path = object.path().to_string();
        self.modify(|p| match p.objects.get(&path) {
            Some(existing) if *existing == object => Vec::new(),
            _ => {
                let added = p.objects.insert(path.clone(), object).is_none();
                if added { vec![relist(p)] } else { vec![PropertyChange::ObjectChanged { path }] }
            }
        })
    }

    /// Remove an exported object.
    pub fn unexport(&self, path: &str) -> bool {
        self.modify(|p| {
            if p.objects.remove(path).is_none() {
                return Vec::new();
            }
            vec![relist(p)]
        })
    }

    /// Point the default of `direction` at `path` ([`NO_OBJECT`] to clear).
    pub fn set_default(&self, direction: Direction, path: &str) -> bool {
        self.modify(|p| {
            let slot = match direction {
                Direction::Sink => &mut p.default_sink,
                Direction::Source => &mut p.default_source,
            };
            if slot == path {
                return Vec::new();
            }
            path.clone_into(slot);
            let path = path.to_string();
            vec![match direction {
                Direction::Sink => PropertyChange::DefaultSink { path },
                Direction::Source => PropertyChange::DefaultSource { path },
            }]
        })
    }

    pub fn set_cards(&self, cards: Vec<CardSummary>, without_unavailable: Vec<CardSummary>) -> bool {
        self.modify(|p| {
            if p.cards == cards && p.cards_without_unavailable == without_unavailable {
                return Vec::new();
            }
            p.cards = cards;
            p.cards_without_unavailable = without_unavailable;
            vec![PropertyChange::Cards]
        })
    }

    pub fn set_bluetooth(&self, mode: &str, opts: Vec<String>) -> bool {
        self.modify(|p| {
            if p.bluetooth_audio_mode == mode && p.bluetooth_audio_mode_opts == opts {
                return Vec::new();
            }
            mode.clone_into(&mut p.bluetooth_audio_mode);
            p.bluetooth_audio_mode_opts.clone_from(&opts);
            vec![PropertyChange::BluetoothMode { mode: mode.to_string(), opts }]
        })
    }

    /// Set the sink-side flags; `None` leaves a value untouched.
    pub fn set_flags(
        &self,
        increase_volume: Option<bool>,
        reduce_noise: Option<bool>,
    ) -> bool {
        self.modify(|p| {
            let increase = increase_volume.unwrap_or(p.increase_volume);
            let reduce = reduce_noise.unwrap_or(p.reduce_noise);
            let max_ui = if increase { 1.5 } else { 1.0 };
            if p.increase_volume == increase
                && p.reduce_noise == reduce
                && (p.max_ui_volume - max_ui).abs() < f64::EPSILON
            {
                return Vec::new();
            }
            p.increase_volume = increase;
            p.reduce_noise = reduce;
            p.max_ui_volume = max_ui;
            vec![PropertyChange::AudioFlags {
                max_ui_volume: max_ui,
                increase_volume: increase,
                reduce_noise: reduce,
            }]
        })
    }

    /// Drop every exported object and reset to defaults.
    pub fn clear(&self) -> bool {
        self.modify(|p| {
            let mut changes = Vec::new();
            let fresh = Properties::default();
            if !p.objects.is_empty() {
                changes.push(PropertyChange::Sinks { paths: Vec::new() });
                changes.push(PropertyChange::Sources { paths: Vec::new() });
                changes.push(PropertyChange::SinkInputs { paths: Vec::new() });
            }
            if p.default_sink != fresh.default_sink {
                changes.push(PropertyChange::DefaultSink { path: NO_OBJECT.to_string() });
            }
            if p.default_source != fresh.default_source {
                changes.push(PropertyChange::DefaultSource { path: NO_OBJECT.to_string() });
            }
            if !p.cards.is_empty() {
                changes.push(PropertyChange::Cards);
            }
            p.objects.clear();
            p.sinks.clear();
            p.sources.clear();
            p.sink_inputs.clear();
            p.default_sink = fresh.default_sink;
            p.default_source = fresh.default_source;
            p.cards.clear();
            p.cards_without_unavailable.clear();
            changes
        })
    }
}

/// Rebuild the path lists from the object map; returns the list that moved.
fn relist(p: &mut Properties) -> PropertyChange {
    let mut sinks = Vec::new();
    let mut sources = Vec::new();
    let mut inputs = Vec::new();
    for (path, object) in &p.objects {
        match object {
            ExportedObject::Endpoint(e) if e.direction == Direction::Sink => sinks.push(path.clone()),
            ExportedObject::Endpoint(_) => sources.push(path.clone()),
            ExportedObject::SinkInput(_) => inputs.push(path.clone()),
        }
    }
    let change = if sinks != p.sinks {
        PropertyChange::Sinks { paths: sinks.clone() }
    } else if sources != p.sources {
        PropertyChange::Sources { paths: sources.clone() }
    } else {
        PropertyChange::SinkInputs { paths: inputs.clone() }
    };
    p.sinks = sinks;
    p.sources = sources;
    p.sink_inputs = inputs;
    change
}
