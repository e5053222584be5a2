//! Commands for state mutations.
//!
//! Commands are produced by the IPC layer and executed on a blocking worker
//! thread; each one either completes or fails with an [`Error`].

use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::Direction;
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::priority::PortType;
use crate::properties::PropertyChange;

/// A command representing a state mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Command {
    /// Activate a port, switching the card profile if needed
    SetPort { card: u32, port: String, direction: Direction },
    /// Enable or disable a port by policy
    SetPortEnabled { card: u32, port: String, enabled: bool },
    /// Switch the default output's Bluetooth card to a mode
    SetBluetoothAudioMode { mode: String },
    /// Restore all volumes to defaults
    Reset,
    /// Mute the default endpoint and set the global toggle
    SetMute { direction: Direction, muted: bool },
    /// Set the level of the default endpoint
    SetVolume { direction: Direction, volume: f64 },
    /// Set the balance of the default endpoint
    SetBalance { direction: Direction, balance: f64 },
    /// Allow output above 100%
    SetIncreaseVolume { enabled: bool },
    /// Noise reduction flag of the default input
    SetReduceNoise { enabled: bool },
    /// Full cold reconciliation
    Reconcile,
}

impl AudioEngine {
    /// Execute a command.
    ///
    /// # Errors
    /// Any [`Error`] the command produced; [`Error::NotReady`] while the
    /// backend is disconnected.
    pub fn execute(&self, command: Command) -> Result<()> {
        debug!(?command, "Executing command");
        if matches!(command, Command::Reconcile) {
            self.reinitialize();
            return Ok(());
        }
        self.ensure_live()?;

        match command {
            Command::SetPort { card, port, direction } => self.set_port(card, &port, direction),
            Command::SetPortEnabled { card, port, enabled } => self.set_port_enabled(card, &port, enabled),
            Command::SetBluetoothAudioMode { mode } => self.set_bluetooth_audio_mode(&mode),
            Command::Reset => self.reset(),
            Command::SetMute { direction, muted } => self.set_mute(direction, muted),
            Command::SetVolume { direction, volume } => self.set_volume(direction, volume),
            Command::SetBalance { direction, balance } => self.set_balance(direction, balance),
            Command::SetIncreaseVolume { enabled } => self.set_increase_volume(enabled),
            Command::SetReduceNoise { enabled } => self.set_reduce_noise(enabled),
            Command::Reconcile => Ok(()),
        }
    }

    /// User port selection: switch, then prefer this port type from now on.
    fn set_port(&self, card: u32, port: &str, direction: Direction) -> Result<()> {
        self.switch_port(card, port, direction)?;

        let port_type = {
            let graph = self.graph.lock();
            graph.cards.get(&card).and_then(|c| c.port(port, direction).map(|p| PortType::classify(c, p)))
        };
        if let Some(port_type) = port_type {
            self.priorities.promote(direction, port_type)?;
        }
        self.switch_counter(direction).store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Store the enabled flag, then re-apply it: a disabled port is muted on
    /// every live endpoint bound to it even if the flag was already clear.
    fn set_port_enabled(&self, card: u32, port: &str, enabled: bool) -> Result<()> {
        let _switch = self.switch_lock.lock();
        let (card_name, direction) = {
            let graph = self.graph.lock();
            let info = graph.cards.get(&card).ok_or(Error::CardNotFound(card))?;
            let p = info
                .ports
                .iter()
                .find(|p| p.name == port)
                .ok_or_else(|| Error::UnknownPort { card, port: port.to_string() })?;
            (info.name.clone(), p.direction)
        };

        if self.keeper.set_port_enabled(&card_name, port, direction, enabled)? {
            info!(card, port, enabled, "Port enabled state changed");
            self.props.notify(PropertyChange::PortEnabled { card, port: port.to_string(), enabled });
        }
        self.publish_cards();
        self.auto_switch_port(direction);

        let mute = !enabled || self.keeper.mute(direction);
        let bound: Vec<u32> = match self.backend.endpoints(direction) {
            Ok(list) => list
                .into_iter()
                .filter(|e| e.card == Some(card) && e.active_port.as_deref() == Some(port))
                .map(|e| e.index)
                .collect(),
            Err(e) => {
                warn!(%direction, error = %e, "Failed to list endpoints, using mirror");
                self.graph.lock().bound_to(card, port).map(|e| e.info.index).collect()
            }
        };
        let mut first_error = None;
        for index in bound {
            debug!(%direction, index, mute, "Applying port mute");
            match self.backend.set_mute(direction, index, mute) {
                Ok(()) => self.sync_endpoint(direction, index),
                Err(e) => {
                    warn!(%direction, index, error = %e, "Failed to apply port mute");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Put every endpoint back to the configured default levels.
    fn reset(&self) -> Result<()> {
        let _switch = self.switch_lock.lock();
        let defaults = self.keeper.defaults();
        info!(output = defaults.output, input = defaults.input, "Resetting volumes");

        for sink in self.backend.sinks()? {
            let card_name = sink.card.and_then(|c| self.graph.lock().card_name(c).map(str::to_string));
            self.backend.set_mute(Direction::Sink, sink.index, false)?;
            for port in &sink.ports {
                self.backend.set_port(Direction::Sink, sink.index, &port.name)?;
                let current = self
                    .backend
                    .endpoint_by_index(Direction::Sink, sink.index)?
                    .map_or_else(|| sink.volume.clone(), |s| s.volume);
                let level = defaults.for_port(Direction::Sink, &port.name);
                let volume = current.with_avg(level).with_balance(0.0).with_fade(0.0);
                self.backend.set_volume(Direction::Sink, sink.index, &volume)?;
                if let Some(card) = &card_name {
                    self.keeper.reset_volume(card, &port.name, Direction::Sink)?;
                }
            }
            if let Some(original) = sink.active_port.as_deref() {
                self.backend.set_port(Direction::Sink, sink.index, original)?;
            }
            self.sync_endpoint(Direction::Sink, sink.index);
        }

        for source in self.backend.sources()? {
            self.backend.set_mute(Direction::Source, source.index, false)?;
            let volume = source.volume.with_avg(defaults.input).with_balance(0.0).with_fade(0.0);
            self.backend.set_volume(Direction::Source, source.index, &volume)?;
            let card_name = source.card.and_then(|c| self.graph.lock().card_name(c).map(str::to_string));
            if let (Some(card), Some(port)) = (card_name, source.active_port.as_deref()) {
                self.keeper.reset_volume(&card, port, Direction::Source)?;
            }
            self.sync_endpoint(Direction::Source, source.index);
        }
        Ok(())
    }

    /// Index and (card name, active port) of the default endpoint.
    fn default_target(&self, direction: Direction) -> Result<(u32, Option<(String, String)>)> {
        let graph = self.graph.lock();
        let endpoint = graph.default_endpoint(direction).ok_or(Error::NoDefault(direction))?;
        let port = graph
            .active_card_port(endpoint)
            .map(|(card, port)| (card.name.clone(), port.name.clone()));
        Ok((endpoint.info.index, port))
    }

    /// The global toggle always follows the request; the endpoint stays muted
    /// while its active port is disabled.
    fn set_mute(&self, direction: Direction, muted: bool) -> Result<()> {
        let (index, port) = self.default_target(direction)?;
        let disabled = port.is_some_and(|(card, port)| !self.keeper.is_port_enabled(&card, &port));
        if disabled && !muted {
            debug!(%direction, index, "Active port is disabled, keeping endpoint muted");
        }
        self.backend.set_mute(direction, index, muted || disabled)?;
        self.keeper.set_mute(direction, muted)?;
        self.sync_endpoint(direction, index);
        Ok(())
    }

    fn set_volume(&self, direction: Direction, volume: f64) -> Result<()> {
        let (index, port) = self.default_target(direction)?;
        let max = match direction {
            Direction::Sink => self.props.load().max_ui_volume,
            Direction::Source => 1.0,
        };
        let volume = volume.clamp(0.0, max);
        let current = self.backend.endpoint_by_index(direction, index)?.ok_or(Error::NoDefault(direction))?;
        self.backend.set_volume(direction, index, &current.volume.with_avg(volume))?;
        if let Some((card, port)) = port {
            self.keeper.set_volume(&card, &port, direction, volume)?;
        }
        self.sync_endpoint(direction, index);
        Ok(())
    }

    fn set_balance(&self, direction: Direction, balance: f64) -> Result<()> {
        let (index, port) = self.default_target(direction)?;
        let balance = balance.clamp(-1.0, 1.0);
        let current = self.backend.endpoint_by_index(direction, index)?.ok_or(Error::NoDefault(direction))?;
        self.backend.set_volume(direction, index, &current.volume.with_balance(balance))?;
        if let Some((card, port)) = port {
            self.keeper.set_balance(&card, &port, direction, balance)?;
        }
        self.sync_endpoint(direction, index);
        Ok(())
    }

    fn set_increase_volume(&self, enabled: bool) -> Result<()> {
        let (index, port) = self.default_target(Direction::Sink)?;
        if let Some((card, port)) = port {
            self.keeper.set_increase_volume(&card, &port, enabled)?;
        }
        self.props.set_flags(Some(enabled), None);

        if !enabled
            && let Some(sink) = self.backend.endpoint_by_index(Direction::Sink, index)?
            && sink.volume.avg() > 1.0
        {
            self.backend.set_volume(Direction::Sink, index, &sink.volume.with_avg(1.0))?;
            self.sync_endpoint(Direction::Sink, index);
        }
        Ok(())
    }

    fn set_reduce_noise(&self, enabled: bool) -> Result<()> {
        let (_, port) = self.default_target(Direction::Source)?;
        if let Some((card, port)) = port {
            self.keeper.set_reduce_noise(&card, &port, enabled)?;
        }
        self.props.set_flags(None, Some(enabled));
        Ok(())
    }
}
