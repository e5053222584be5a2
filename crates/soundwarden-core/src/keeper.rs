//! Config Keeper: cached per-port policy records and global mute toggles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::Direction;
use crate::error::Result;
use crate::store::{MuteConfig, PolicyStore, PortConfig, PortKey};

/// Default levels for fresh records and for reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeDefaults {
    pub output: f64,
    pub headphone_output: f64,
    pub input: f64,
}

impl Default for VolumeDefaults {
    fn default() -> Self {
        Self { output: 0.5, headphone_output: 0.17, input: 0.1 }
    }
}

impl VolumeDefaults {
    /// Default level for a port, by direction and name.
    #[must_use]
    pub fn for_port(&self, direction: Direction, port: &str) -> f64 {
        match direction {
            Direction::Source => self.input,
            Direction::Sink if is_headphone_port(port) => self.headphone_output,
            Direction::Sink => self.output,
        }
    }
}

/// Whether a port name looks like a headphone or headset jack.
#[must_use]
pub fn is_headphone_port(port: &str) -> bool {
    let lower = port.to_ascii_lowercase();
    lower.contains("headphone") || lower.contains("headset")
}

/// Persisted per-port policy with a write-through cache.
pub struct ConfigKeeper {
    store: Arc<dyn PolicyStore>,
    defaults: VolumeDefaults,
    ports: RwLock<HashMap<PortKey, PortConfig>>,
    mute: RwLock<MuteConfig>,
}

impl ConfigKeeper {
    pub fn new(store: Arc<dyn PolicyStore>, defaults: VolumeDefaults) -> Self {
        let mute = store.mute_config().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load mute settings, using defaults");
            MuteConfig::default()
        });
        Self { store, defaults, ports: RwLock::new(HashMap::new()), mute: RwLock::new(mute) }
    }

    #[must_use]
    pub fn defaults(&self) -> VolumeDefaults {
        self.defaults
    }

    /// Record for (card, port), created with defaults on first use.
    pub fn port_config(&self, card: &str, port: &str, direction: Direction) -> PortConfig {
        let key = PortKey::new(card, port);
        if let Some(config) = self.lookup(&key) {
            return config;
        }

        let config = PortConfig::with_volume(self.defaults.for_port(direction, port));
        debug!(card, port, %direction, volume = config.volume, "Creating port policy record");
        if let Err(e) = self.store.save_port_config(&key, &config) {
            warn!(card, port, error = %e, "Failed to persist new port policy record");
        }
        self.ports.write().insert(key, config.clone());
        config
    }

    /// Whether (card, port) is enabled. Unknown ports are enabled.
    pub fn is_port_enabled(&self, card: &str, port: &str) -> bool {
        self.lookup(&PortKey::new(card, port)).is_none_or(|c| c.enabled)
    }

    /// Returns `true` when the stored flag changed.
    pub fn set_port_enabled(
        &self,
        card: &str,
        port: &str,
        direction: Direction,
        enabled: bool,
    ) -> Result<bool> {
        let mut changed = false;
        self.update(card, port, direction, |c| {
            changed = c.enabled != enabled;
            c.enabled = enabled;
        })?;
        Ok(changed)
    }

    pub fn set_volume(&self, card: &str, port: &str, direction: Direction, volume: f64) -> Result<()> {
        self.update(card, port, direction, |c| c.volume = volume)
    }

    pub fn set_balance(&self, card: &str, port: &str, direction: Direction, balance: f64) -> Result<()> {
        self.update(card, port, direction, |c| c.balance = balance)
    }

    pub fn set_increase_volume(&self, card: &str, port: &str, enabled: bool) -> Result<()> {
        self.update(card, port, Direction::Sink, |c| c.increase_volume = enabled)
    }

    pub fn set_reduce_noise(&self, card: &str, port: &str, enabled: bool) -> Result<()> {
        self.update(card, port, Direction::Source, |c| c.reduce_noise = enabled)
    }

    /// Put the stored volume and balance back to defaults.
    pub fn reset_volume(&self, card: &str, port: &str, direction: Direction) -> Result<()> {
        let volume = self.defaults.for_port(direction, port);
        self.update(card, port, direction, |c| {
            c.volume = volume;
            c.balance = 0.0;
        })
    }

    /// Global mute toggle for `direction`.
    pub fn mute(&self, direction: Direction) -> bool {
        self.mute.read().get(direction)
    }

    pub fn set_mute(&self, direction: Direction, muted: bool) -> Result<()> {
        let mut mute = self.mute.write();
        if mute.get(direction) == muted {
            return Ok(());
        }
        let mut next = *mute;
        next.set(direction, muted);
        self.store.save_mute_config(&next)?;
        *mute = next;
        Ok(())
    }

    fn lookup(&self, key: &PortKey) -> Option<PortConfig> {
        if let Some(config) = self.ports.read().get(key) {
            return Some(config.clone());
        }
        match self.store.port_config(key) {
            Ok(Some(config)) => {
                self.ports.write().insert(key.clone(), config.clone());
                Some(config)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(card = %key.card, port = %key.port, error = %e, "Failed to read port policy record");
                None
            }
        }
    }

    fn update(
        &self,
        card: &str,
        port: &str,
        direction: Direction,
        apply: impl FnOnce(&mut PortConfig),
    ) -> Result<()> {
        let mut config = self.port_config(card, port, direction);
        let before = config.clone();
        apply(&mut config);
        if config == before {
            return Ok(());
        }
        let key = PortKey::new(card, port);
        self.store.save_port_config(&key, &config)?;
        self.ports.write().insert(key, config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn keeper() -> (Arc<MemoryStore>, ConfigKeeper) {
        let store = Arc::new(MemoryStore::new());
        let keeper = ConfigKeeper::new(store.clone(), VolumeDefaults::default());
        (store, keeper)
    }

    #[test]
    fn test_record_created_lazily_with_defaults() {
        let (store, keeper) = keeper();
        let key = PortKey::new("card", "analog-output-headphones");
        assert!(store.port_config(&key).expect("Failed to read").is_none());

        let config = keeper.port_config("card", "analog-output-headphones", Direction::Sink);
        assert!(config.enabled);
        assert!((config.volume - 0.17).abs() < f64::EPSILON);
        assert_eq!(store.port_config(&key).expect("Failed to read"), Some(config));

        let speaker = keeper.port_config("card", "analog-output-speaker", Direction::Sink);
        assert!((speaker.volume - 0.5).abs() < f64::EPSILON);
        let mic = keeper.port_config("card", "analog-input-mic", Direction::Source);
        assert!((mic.volume - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_port_enabled_reports_change() {
        let (store, keeper) = keeper();
        assert!(keeper.is_port_enabled("card", "speaker"));
        assert!(keeper.set_port_enabled("card", "speaker", Direction::Sink, false).expect("Failed to set"));
        assert!(!keeper.set_port_enabled("card", "speaker", Direction::Sink, false).expect("Failed to set"));
        assert!(!keeper.is_port_enabled("card", "speaker"));

        // A second keeper over the same store sees the persisted flag.
        let reopened = ConfigKeeper::new(store, VolumeDefaults::default());
        assert!(!reopened.is_port_enabled("card", "speaker"));
    }

    #[test]
    fn test_global_mute_persists() {
        let (store, keeper) = keeper();
        keeper.set_mute(Direction::Source, true).expect("Failed to set mute");
        assert!(keeper.mute(Direction::Source));
        assert!(!keeper.mute(Direction::Sink));
        assert!(store.mute_config().expect("Failed to read").mute_input);
    }

    #[test]
    fn test_reset_volume() {
        let (_, keeper) = keeper();
        keeper.set_volume("card", "speaker", Direction::Sink, 0.9).expect("Failed to set volume");
        keeper.set_balance("card", "speaker", Direction::Sink, 0.3).expect("Failed to set balance");
        keeper.reset_volume("card", "speaker", Direction::Sink).expect("Failed to reset");
        let config = keeper.port_config("card", "speaker", Direction::Sink);
        assert!((config.volume - 0.5).abs() < f64::EPSILON);
        assert!(config.balance.abs() < f64::EPSILON);
    }
}
