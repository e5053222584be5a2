//! Priority Manager: per-direction preference order over port types.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::{CardInfo, CardPort, Direction};
use crate::error::{Error, Result};
use crate::store::PolicyStore;

/// Coarse class of a port, the unit of auto-selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Bluetooth,
    Headset,
    Headphones,
    Usb,
    Hdmi,
    LineIo,
    Speaker,
    BuiltinMic,
    Multichannel,
    Unknown,
}

impl PortType {
    pub const ALL: [Self; 10] = [
        Self::Bluetooth,
        Self::Headset,
        Self::Headphones,
        Self::Usb,
        Self::Hdmi,
        Self::LineIo,
        Self::Speaker,
        Self::BuiltinMic,
        Self::Multichannel,
        Self::Unknown,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bluetooth => "bluetooth",
            Self::Headset => "headset",
            Self::Headphones => "headphones",
            Self::Usb => "usb",
            Self::Hdmi => "hdmi",
            Self::LineIo => "line_io",
            Self::Speaker => "speaker",
            Self::BuiltinMic => "builtin_mic",
            Self::Multichannel => "multichannel",
            Self::Unknown => "unknown",
        }
    }

    /// Classify a card port.
    #[must_use]
    pub fn classify(card: &CardInfo, port: &CardPort) -> Self {
        if card.is_bluetooth() {
            return Self::Bluetooth;
        }
        if card.properties.get("device.bus").is_some_and(|b| b == "usb") {
            return Self::Usb;
        }

        let mut text = port.name.to_ascii_lowercase();
        if let Some(hint) = &port.port_type {
            text.push(' ');
            text.push_str(&hint.to_ascii_lowercase());
        }

        if text.contains("headset") {
            Self::Headset
        } else if text.contains("headphone") {
            Self::Headphones
        } else if text.contains("hdmi") || text.contains("displayport") {
            Self::Hdmi
        } else if text.contains("line") {
            Self::LineIo
        } else if text.contains("speaker") {
            Self::Speaker
        } else if text.contains("mic") {
            Self::BuiltinMic
        } else if text.contains("multichannel") || text.contains("surround") {
            Self::Multichannel
        } else {
            Self::Unknown
        }
    }

    /// Factory preference order for `direction`.
    #[must_use]
    pub fn default_order(direction: Direction) -> Vec<Self> {
        match direction {
            Direction::Sink => vec![
                Self::Bluetooth,
                Self::Headset,
                Self::Headphones,
                Self::Usb,
                Self::Hdmi,
                Self::LineIo,
                Self::Speaker,
                Self::Multichannel,
                Self::BuiltinMic,
                Self::Unknown,
            ],
            Direction::Source => vec![
                Self::Bluetooth,
                Self::Headset,
                Self::Usb,
                Self::LineIo,
                Self::BuiltinMic,
                Self::Multichannel,
                Self::Headphones,
                Self::Hdmi,
                Self::Speaker,
                Self::Unknown,
            ],
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Store(format!("unknown port type {s:?}")))
    }
}

/// Ordered port type preferences, one list per direction.
pub struct PriorityManager {
    store: Arc<dyn PolicyStore>,
    lists: RwLock<HashMap<Direction, Vec<PortType>>>,
}

impl PriorityManager {
    /// Load stored orders, falling back to the factory order.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        let mut lists = HashMap::new();
        for direction in [Direction::Sink, Direction::Source] {
            let stored = store.priorities(direction).unwrap_or_else(|e| {
                warn!(%direction, error = %e, "Failed to load port priorities");
                None
            });
            lists.insert(direction, normalize(direction, stored));
        }
        Self { store, lists: RwLock::new(lists) }
    }

    /// Current order for `direction`.
    pub fn order(&self, direction: Direction) -> Vec<PortType> {
        self.lists.read().get(&direction).cloned().unwrap_or_else(|| PortType::default_order(direction))
    }

    /// Highest ranked type among `available`.
    ///
    /// Falls back to the first entry of `available` when none is ranked, so
    /// this is `None` only for an empty candidate set.
    pub fn first_eligible_port_type(&self, direction: Direction, available: &[PortType]) -> Option<PortType> {
        let lists = self.lists.read();
        lists
            .get(&direction)
            .and_then(|order| order.iter().copied().find(|t| available.contains(t)))
            .or_else(|| available.first().copied())
    }

    /// Move `port_type` to the front of the list and persist.
    pub fn promote(&self, direction: Direction, port_type: PortType) -> Result<()> {
        let mut lists = self.lists.write();
        let order = lists.entry(direction).or_insert_with(|| PortType::default_order(direction));
        if order.first() == Some(&port_type) {
            return Ok(());
        }
        order.retain(|t| *t != port_type);
        order.insert(0, port_type);
        debug!(%direction, %port_type, "Promoted port type");
        self.store.save_priorities(direction, order)
    }
}

/// Drop duplicates and append any missing type in factory order.
fn normalize(direction: Direction, stored: Option<Vec<PortType>>) -> Vec<PortType> {
    let mut order: Vec<PortType> = Vec::new();
    for t in stored.into_iter().flatten().chain(PortType::default_order(direction)) {
        if !order.contains(&t) {
            order.push(t);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Availability;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn manager() -> (Arc<MemoryStore>, PriorityManager) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), PriorityManager::new(store))
    }

    #[test]
    fn test_first_eligible_follows_order() {
        let (_, pm) = manager();
        let available = [PortType::Speaker, PortType::Headphones];
        assert_eq!(pm.first_eligible_port_type(Direction::Sink, &available), Some(PortType::Headphones));
        assert_eq!(pm.first_eligible_port_type(Direction::Sink, &[]), None);
    }

    #[test]
    fn test_promote_is_idempotent_and_persisted() {
        let (store, pm) = manager();
        pm.promote(Direction::Source, PortType::BuiltinMic).expect("Failed to promote");
        pm.promote(Direction::Source, PortType::BuiltinMic).expect("Failed to promote");
        let order = pm.order(Direction::Source);
        assert_eq!(order[0], PortType::BuiltinMic);
        assert_eq!(order.iter().filter(|t| **t == PortType::BuiltinMic).count(), 1);
        assert_eq!(store.priorities(Direction::Source).expect("Failed to read"), Some(order));

        let reloaded = PriorityManager::new(store);
        assert_eq!(reloaded.order(Direction::Source)[0], PortType::BuiltinMic);
    }

    #[test]
    fn test_stored_list_is_completed() {
        let store = Arc::new(MemoryStore::new());
        store.save_priorities(Direction::Sink, &[PortType::Speaker]).expect("Failed to save");
        let pm = PriorityManager::new(store);
        let order = pm.order(Direction::Sink);
        assert_eq!(order[0], PortType::Speaker);
        assert_eq!(order.len(), PortType::ALL.len());
    }

    #[test]
    fn test_port_type_round_trips_through_str() {
        for t in PortType::ALL {
            assert_eq!(t.as_str().parse::<PortType>().expect("Failed to parse"), t);
        }
        assert!("nonsense".parse::<PortType>().is_err());
    }

    #[test]
    fn test_classify() {
        let card = CardInfo {
            index: 0,
            name: "alsa_card.pci-0000_00_1f.3".into(),
            properties: HashMap::new(),
            profiles: vec![],
            active_profile: None,
            ports: vec![],
        };
        let port = |name: &str, direction| CardPort {
            name: name.into(),
            description: String::new(),
            direction,
            availability: Availability::Unknown,
            priority: 0,
            profiles: vec![],
            port_type: None,
        };
        assert_eq!(PortType::classify(&card, &port("analog-output-headphones", Direction::Sink)), PortType::Headphones);
        assert_eq!(PortType::classify(&card, &port("analog-output-speaker", Direction::Sink)), PortType::Speaker);
        assert_eq!(PortType::classify(&card, &port("analog-input-internal-mic", Direction::Source)), PortType::BuiltinMic);
        assert_eq!(PortType::classify(&card, &port("analog-input-headset-mic", Direction::Source)), PortType::Headset);
        assert_eq!(PortType::classify(&card, &port("hdmi-output-0", Direction::Sink)), PortType::Hdmi);

        let mut bt = card.clone();
        bt.name = "bluez_card.00_11_22_33_44_55".into();
        assert_eq!(PortType::classify(&bt, &port("headset-output", Direction::Sink)), PortType::Bluetooth);
    }

    proptest! {
        #[test]
        fn prop_fallback_never_empty(
            promoted in proptest::sample::select(PortType::ALL.to_vec()),
            available in proptest::sample::subsequence(PortType::ALL.to_vec(), 1..=PortType::ALL.len()),
        ) {
            let (_, pm) = manager();
            pm.promote(Direction::Sink, promoted).expect("Failed to promote");
            let chosen = pm.first_eligible_port_type(Direction::Sink, &available);
            prop_assert!(chosen.is_some_and(|t| available.contains(&t)));
            if available.contains(&promoted) {
                prop_assert_eq!(chosen, Some(promoted));
            }
        }
    }
}
