//! In-memory mirror of the backend device graph.
//!
//! Collections are keyed by backend index. The default pointers always name a
//! live entry of the matching collection or are empty.

use std::collections::BTreeMap;

use crate::device::{CardInfo, CardPort, Direction, EndpointInfo, EndpointKind, SinkInputInfo};
use crate::properties::endpoint_path;
use crate::state::MirrorCounts;

/// A mirrored sink or source with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredEndpoint {
    pub info: EndpointInfo,
    pub kind: EndpointKind,
    pub path: String,
}

impl MirroredEndpoint {
    #[must_use]
    pub fn new(info: EndpointInfo) -> Self {
        let kind = EndpointKind::classify(&info);
        let path = endpoint_path(info.direction, info.index);
        Self { info, kind, path }
    }
}

/// The mirrored collections and default pointers.
#[derive(Debug, Default)]
pub struct DeviceGraph {
    pub cards: BTreeMap<u32, CardInfo>,
    pub sinks: BTreeMap<u32, MirroredEndpoint>,
    pub sources: BTreeMap<u32, MirroredEndpoint>,
    pub sink_inputs: BTreeMap<u32, SinkInputInfo>,
    default_sink: Option<u32>,
    default_source: Option<u32>,
    /// Last default names reported by the backend, before master resolution
    reported_sink: String,
    reported_source: String,
}

impl DeviceGraph {
    #[must_use]
    pub fn endpoints(&self, direction: Direction) -> &BTreeMap<u32, MirroredEndpoint> {
        match direction {
            Direction::Sink => &self.sinks,
            Direction::Source => &self.sources,
        }
    }

    pub fn endpoints_mut(&mut self, direction: Direction) -> &mut BTreeMap<u32, MirroredEndpoint> {
        match direction {
            Direction::Sink => &mut self.sinks,
            Direction::Source => &mut self.sources,
        }
    }

    #[must_use]
    pub fn endpoint(&self, direction: Direction, index: u32) -> Option<&MirroredEndpoint> {
        self.endpoints(direction).get(&index)
    }

    #[must_use]
    pub fn default_index(&self, direction: Direction) -> Option<u32> {
        match direction {
            Direction::Sink => self.default_sink,
            Direction::Source => self.default_source,
        }
    }

    #[must_use]
    pub fn default_endpoint(&self, direction: Direction) -> Option<&MirroredEndpoint> {
        self.default_index(direction).and_then(|i| self.endpoint(direction, i))
    }

    /// Backend-reported default name seen at the last resolution.
    #[must_use]
    pub fn reported_default(&self, direction: Direction) -> &str {
        match direction {
            Direction::Sink => &self.reported_sink,
            Direction::Source => &self.reported_source,
        }
    }

    /// Point the default at `index`, which must be mirrored, or clear it.
    ///
    /// Returns `false` if `index` is not a live entry; the pointer is left
    /// untouched in that case.
    pub fn set_default(&mut self, direction: Direction, index: Option<u32>, reported: &str) -> bool {
        if let Some(i) = index
            && !self.endpoints(direction).contains_key(&i)
        {
            return false;
        }
        let (slot, name) = match direction {
            Direction::Sink => (&mut self.default_sink, &mut self.reported_sink),
            Direction::Source => (&mut self.default_source, &mut self.reported_source),
        };
        *slot = index;
        reported.clone_into(name);
        true
    }

    /// Remove an endpoint, clearing the default pointer if it was the default.
    pub fn remove_endpoint(&mut self, direction: Direction, index: u32) -> Option<MirroredEndpoint> {
        let removed = self.endpoints_mut(direction).remove(&index)?;
        if self.default_index(direction) == Some(index) {
            self.set_default(direction, None, "");
        }
        Some(removed)
    }

    #[must_use]
    pub fn card_name(&self, index: u32) -> Option<&str> {
        self.cards.get(&index).map(|c| c.name.as_str())
    }

    /// The card port an endpoint is currently serving.
    #[must_use]
    pub fn active_card_port(&self, endpoint: &MirroredEndpoint) -> Option<(&CardInfo, &CardPort)> {
        let card = self.cards.get(&endpoint.info.card?)?;
        let port = card.port(endpoint.info.active_port.as_deref()?, endpoint.info.direction)?;
        Some((card, port))
    }

    /// Endpoints currently bound to (card, port).
    pub fn bound_to<'a>(&'a self, card: u32, port: &'a str) -> impl Iterator<Item = &'a MirroredEndpoint> + 'a {
        self.sinks
            .values()
            .chain(self.sources.values())
            .filter(move |e| e.info.card == Some(card) && e.info.active_port.as_deref() == Some(port))
    }

    #[must_use]
    pub fn counts(&self) -> MirrorCounts {
        MirrorCounts {
            cards: self.cards.len(),
            sinks: self.sinks.len(),
            sources: self.sources.len(),
            sink_inputs: self.sink_inputs.len(),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Outcome of diffing a collection against a backend snapshot.
#[derive(Debug)]
pub struct Plan<T> {
    /// In the snapshot, not mirrored
    pub added: Vec<T>,
    /// In both
    pub updated: Vec<T>,
    /// Mirrored, not in the snapshot
    pub removed: Vec<u32>,
}

/// Diff `snapshot` against `current` by index.
pub fn plan<T, V>(current: &BTreeMap<u32, V>, snapshot: Vec<T>, index: impl Fn(&T) -> u32) -> Plan<T> {
    let mut seen = Vec::with_capacity(snapshot.len());
    let mut added = Vec::new();
    let mut updated = Vec::new();
    for item in snapshot {
        let i = index(&item);
        seen.push(i);
        if current.contains_key(&i) {
            updated.push(item);
        } else {
            added.push(item);
        }
    }
    let removed = current.keys().copied().filter(|i| !seen.contains(i)).collect();
    Plan { added, updated, removed }
}
