//! Persisted policy storage seam.
//!
//! Everything is keyed by stable card and port names, never by backend
//! indices, so policy survives re-enumeration.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::device::Direction;
use crate::error::Result;
use crate::priority::PortType;

/// Persisted policy for one (card, port) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub enabled: bool,
    pub volume: f64,
    pub balance: f64,
    pub increase_volume: bool,
    pub reduce_noise: bool,
}

impl PortConfig {
    /// A fresh record at `volume`.
    #[must_use]
    pub fn with_volume(volume: f64) -> Self {
        Self { enabled: true, volume, balance: 0.0, increase_volume: false, reduce_noise: false }
    }
}

/// Global mute toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteConfig {
    pub mute_output: bool,
    pub mute_input: bool,
}

impl MuteConfig {
    #[must_use]
    pub fn get(&self, direction: Direction) -> bool {
        match direction {
            Direction::Sink => self.mute_output,
            Direction::Source => self.mute_input,
        }
    }

    pub fn set(&mut self, direction: Direction, muted: bool) {
        match direction {
            Direction::Sink => self.mute_output = muted,
            Direction::Source => self.mute_input = muted,
        }
    }
}

/// A (card name, port name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortKey {
    pub card: String,
    pub port: String,
}

impl PortKey {
    pub fn new(card: impl Into<String>, port: impl Into<String>) -> Self {
        Self { card: card.into(), port: port.into() }
    }
}

/// Durable storage for policy.
pub trait PolicyStore: Send + Sync {
    fn port_config(&self, key: &PortKey) -> Result<Option<PortConfig>>;

    fn save_port_config(&self, key: &PortKey, config: &PortConfig) -> Result<()>;

    /// Every stored record.
    fn port_configs(&self) -> Result<Vec<(PortKey, PortConfig)>>;

    fn mute_config(&self) -> Result<MuteConfig>;

    fn save_mute_config(&self, config: &MuteConfig) -> Result<()>;

    /// Stored port type order, `None` if never saved.
    fn priorities(&self, direction: Direction) -> Result<Option<Vec<PortType>>>;

    fn save_priorities(&self, direction: Direction, order: &[PortType]) -> Result<()>;

    fn bluetooth_mode(&self, card: &str) -> Result<Option<String>>;

    fn save_bluetooth_mode(&self, card: &str, mode: &str) -> Result<()>;

    /// The port last chosen for `direction`.
    fn last_selected(&self, direction: Direction) -> Result<Option<PortKey>>;

    fn save_last_selected(&self, direction: Direction, key: &PortKey) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    ports: HashMap<PortKey, PortConfig>,
    mute: MuteConfig,
    priorities: HashMap<Direction, Vec<PortType>>,
    bluetooth: HashMap<String, String>,
    last_selected: HashMap<Direction, PortKey>,
}

/// Volatile [`PolicyStore`], used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicyStore for MemoryStore {
    fn port_config(&self, key: &PortKey) -> Result<Option<PortConfig>> {
        Ok(self.inner.lock().ports.get(key).cloned())
    }

    fn save_port_config(&self, key: &PortKey, config: &PortConfig) -> Result<()> {
        self.inner.lock().ports.insert(key.clone(), config.clone());
        Ok(())
    }

    fn port_configs(&self) -> Result<Vec<(PortKey, PortConfig)>> {
        Ok(self.inner.lock().ports.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn mute_config(&self) -> Result<MuteConfig> {
        Ok(self.inner.lock().mute)
    }

    fn save_mute_config(&self, config: &MuteConfig) -> Result<()> {
        self.inner.lock().mute = *config;
        Ok(())
    }

    fn priorities(&self, direction: Direction) -> Result<Option<Vec<PortType>>> {
        Ok(self.inner.lock().priorities.get(&direction).cloned())
    }

    fn save_priorities(&self, direction: Direction, order: &[PortType]) -> Result<()> {
        self.inner.lock().priorities.insert(direction, order.to_vec());
        Ok(())
    }

    fn bluetooth_mode(&self, card: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().bluetooth.get(card).cloned())
    }

    fn save_bluetooth_mode(&self, card: &str, mode: &str) -> Result<()> {
        self.inner.lock().bluetooth.insert(card.to_string(), mode.to_string());
        Ok(())
    }

    fn last_selected(&self, direction: Direction) -> Result<Option<PortKey>> {
        Ok(self.inner.lock().last_selected.get(&direction).cloned())
    }

    fn save_last_selected(&self, direction: Direction, key: &PortKey) -> Result<()> {
        self.inner.lock().last_selected.insert(direction, key.clone());
        Ok(())
    }
}
