//! Bluetooth audio mode switching.

use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::device::{CardInfo, Direction};
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::priority::PortType;

/// High quality playback mode.
pub const MODE_A2DP: &str = "a2dp";
/// Bidirectional headset mode.
pub const MODE_HEADSET: &str = "headset";

const MODES: [&str; 2] = [MODE_A2DP, MODE_HEADSET];

/// Mode a profile name belongs to.
#[must_use]
pub fn mode_of_profile(profile: &str) -> Option<&'static str> {
    let lower = profile.to_ascii_lowercase();
    MODES.into_iter().find(|m| lower.contains(m))
}

/// First available profile of `card` implementing `mode`.
#[must_use]
pub fn profile_for_mode<'a>(card: &'a CardInfo, mode: &str) -> Option<&'a str> {
    card.profiles
        .iter()
        .find(|p| p.available && p.name.to_ascii_lowercase().contains(mode))
        .map(|p| p.name.as_str())
}

/// Modes `card` can currently be switched to.
#[must_use]
pub fn mode_opts(card: &CardInfo) -> Vec<String> {
    MODES.into_iter().filter(|m| profile_for_mode(card, m).is_some()).map(str::to_string).collect()
}

impl AudioEngine {
    /// The card behind the default sink.
    fn default_sink_card(&self) -> Option<CardInfo> {
        let graph = self.graph.lock();
        let sink = graph.default_endpoint(Direction::Sink)?;
        graph.cards.get(&sink.info.card?).cloned()
    }

    /// Switch the default output's Bluetooth card to `mode`.
    ///
    /// # Errors
    /// [`Error::NotBluetooth`] if the default output is not a Bluetooth
    /// device, [`Error::UnsupportedMode`] if no available profile implements
    /// the mode.
    pub(crate) fn set_bluetooth_audio_mode(&self, mode: &str) -> Result<()> {
        let _switch = self.switch_lock.lock();
        let card = self.default_sink_card().ok_or(Error::NoDefault(Direction::Sink))?;
        if !card.is_bluetooth() {
            return Err(Error::NotBluetooth(card.name));
        }
        let profile = profile_for_mode(&card, mode)
            .ok_or_else(|| Error::UnsupportedMode { card: card.name.clone(), mode: mode.to_string() })?
            .to_string();

        if let Err(e) = self.store.save_bluetooth_mode(&card.name, mode) {
            warn!(card = %card.name, mode, error = %e, "Failed to persist bluetooth mode");
        }
        info!(card = %card.name, mode, profile, "Switching bluetooth audio mode");
        self.apply_profile(card.index, &profile)?;

        if mode == MODE_HEADSET {
            self.switch_counter(Direction::Source).store(0, Ordering::Relaxed);
            self.priorities.promote(Direction::Source, PortType::Bluetooth)?;
        }
        self.refresh_defaults();
        self.refresh_bluetooth();
        Ok(())
    }

    /// Publish the mode and options of the default output's card.
    pub(crate) fn refresh_bluetooth(&self) {
        let (mode, opts) = match self.default_sink_card() {
            Some(card) if card.is_bluetooth() => (
                mode_of_profile(card.active_profile_name()).unwrap_or_default().to_string(),
                mode_opts(&card),
            ),
            _ => (String::new(), Vec::new()),
        };
        self.props.set_bluetooth(&mode, opts);
    }

    /// Re-apply the persisted mode of a Bluetooth card that just appeared.
    pub(crate) fn restore_bluetooth_mode(&self, card: &CardInfo) {
        let mode = match self.store.bluetooth_mode(&card.name) {
            Ok(Some(mode)) => mode,
            Ok(None) => return,
            Err(e) => {
                warn!(card = %card.name, error = %e, "Failed to read bluetooth mode");
                return;
            }
        };
        if mode_of_profile(card.active_profile_name()) == Some(mode.as_str()) {
            return;
        }
        let Some(profile) = profile_for_mode(card, &mode) else {
            debug!(card = %card.name, mode, "Stored bluetooth mode not available");
            return;
        };
        info!(card = %card.name, mode, profile, "Restoring bluetooth audio mode");
        if let Err(e) = self.apply_profile(card.index, profile) {
            warn!(card = %card.name, mode, error = %e, "Failed to restore bluetooth mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;
    use crate::store::{MemoryStore, PolicyStore};
    use crate::testing::{Call, FakeBackend, bluetooth_card, laptop_card, live_engine};

    #[test]
    fn test_mode_helpers() {
        assert_eq!(mode_of_profile("a2dp_sink"), Some(MODE_A2DP));
        assert_eq!(mode_of_profile("headset-head-unit"), Some(MODE_HEADSET));
        assert_eq!(mode_of_profile("off"), None);
        let card = bluetooth_card(2);
        assert_eq!(mode_opts(&card), vec!["a2dp".to_string(), "headset".to_string()]);
        assert_eq!(profile_for_mode(&card, MODE_HEADSET), Some("headset_head_unit"));
    }

    #[test]
    fn test_not_bluetooth() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = live_engine(&fake, Arc::new(MemoryStore::new()));
        assert_matches!(engine.set_bluetooth_audio_mode(MODE_A2DP), Err(Error::NotBluetooth(_)));
    }

    #[test]
    fn test_headset_mode_promotes_bluetooth_input() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(bluetooth_card(2));
        let store = Arc::new(MemoryStore::new());
        let engine = live_engine(&fake, store.clone());
        engine.switch_port(2, "headset-output", Direction::Sink).expect("Failed to switch");
        assert_eq!(engine.properties().bluetooth_audio_mode, MODE_A2DP);
        assert_eq!(engine.properties().bluetooth_audio_mode_opts.len(), 2);

        engine.set_bluetooth_audio_mode(MODE_HEADSET).expect("Failed to set mode");

        assert!(fake.calls().contains(&Call::SetCardProfile(2, "headset_head_unit".into())));
        assert_eq!(store.bluetooth_mode("bluez_card.00_11_22_33_44_55").expect("Failed to read"), Some("headset".into()));
        assert_eq!(engine.priorities.order(Direction::Source)[0], PortType::Bluetooth);
        assert_eq!(engine.diagnostics().input_auto_switch_count, 0);
        assert_eq!(engine.properties().bluetooth_audio_mode, MODE_HEADSET);
    }

    #[test]
    fn test_unsupported_mode() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(bluetooth_card(2));
        let engine = live_engine(&fake, Arc::new(MemoryStore::new()));
        engine.switch_port(2, "headset-output", Direction::Sink).expect("Failed to switch");
        assert_matches!(engine.set_bluetooth_audio_mode("lc3"), Err(Error::UnsupportedMode { .. }));
    }

    #[test]
    fn test_mode_restored_when_card_reappears() {
        let fake = Arc::new(FakeBackend::new());
        let store = Arc::new(MemoryStore::new());
        store.save_bluetooth_mode("bluez_card.00_11_22_33_44_55", MODE_A2DP).expect("Failed to save");
        let engine = live_engine(&fake, store);

        fake.plug_card(bluetooth_card(2));
        engine.refresh();

        assert!(fake.calls().contains(&Call::SetCardProfile(2, "a2dp_sink".into())));
        assert_eq!(fake.card(2).expect("Expected card").active_profile.as_deref(), Some("a2dp_sink"));
    }
}
