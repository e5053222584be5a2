//! The [`Backend`] implementation for a PipeWire session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use soundwarden_core::{
    Backend, BackendEvent, CardInfo, ChannelVolume, Direction, EndpointInfo, ServerInfo, ServerState, SinkInputInfo,
};

use crate::pactl::{self, Pactl};
use crate::subscribe;
use crate::watchdog::Watchdog;

/// Capacity of the event and state channels.
const CHANNEL_CAPACITY: usize = 256;

/// How to reach the audio server.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// `pactl` binary
    pub pactl: String,
    /// Delay before restarting `pactl subscribe`
    pub resubscribe_delay: Duration,
    /// Delay before reconnecting the watchdog
    pub watchdog_retry: Duration,
    /// Longest a single `pactl` query or command may run
    pub command_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            pactl: "pactl".to_string(),
            resubscribe_delay: Duration::from_millis(1000),
            watchdog_retry: Duration::from_millis(2000),
            command_timeout: Duration::from_secs(5),
        }
    }
}

/// Receivers for the backend's two streams.
pub struct BackendStreams {
    pub events: mpsc::Receiver<BackendEvent>,
    pub states: mpsc::Receiver<ServerState>,
}

/// PipeWire backend: `pactl` for queries and commands, `pactl subscribe`
/// for change events, and a native connection for server state.
pub struct PipeWireBackend {
    pactl: Pactl,
    watchdog: Mutex<Option<Watchdog>>,
    stop_subscriber: watch::Sender<bool>,
}

impl PipeWireBackend {
    /// Start the event subscription and the watchdog.
    ///
    /// Must be called from within a multi-threaded tokio runtime; backend
    /// calls block on it and must come from blocking threads.
    ///
    /// # Errors
    /// Returns an error if the watchdog thread cannot be spawned.
    pub fn spawn(config: &BackendConfig) -> crate::PwResult<(Arc<Self>, BackendStreams)> {
        let (event_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let (state_tx, states) = mpsc::channel(CHANNEL_CAPACITY);
        let (stop_subscriber, stop_rx) = watch::channel(false);

        info!(pactl = %config.pactl, "Starting audio server event subscription");
        tokio::spawn(subscribe::run(config.pactl.clone(), config.resubscribe_delay, event_tx, stop_rx));
        let watchdog = Watchdog::spawn(state_tx, config.watchdog_retry)?;

        let backend = Arc::new(Self {
            pactl: Pactl::new(config.pactl.clone(), config.command_timeout, Handle::current()),
            watchdog: Mutex::new(Some(watchdog)),
            stop_subscriber,
        });
        Ok((backend, BackendStreams { events, states }))
    }

    /// Stop the subscription and the watchdog. Both streams close afterwards.
    pub fn shutdown(&self) {
        info!("Stopping PipeWire backend");
        let _ = self.stop_subscriber.send(true);
        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.shutdown();
        } else {
            warn!("PipeWire backend already stopped");
        }
    }
}

impl Backend for PipeWireBackend {
    fn server_info(&self) -> soundwarden_core::Result<ServerInfo> {
        Ok(self.pactl.server_info()?)
    }

    fn cards(&self) -> soundwarden_core::Result<Vec<CardInfo>> {
        Ok(self.pactl.cards()?)
    }

    fn sinks(&self) -> soundwarden_core::Result<Vec<EndpointInfo>> {
        Ok(self.pactl.sinks()?)
    }

    fn sources(&self) -> soundwarden_core::Result<Vec<EndpointInfo>> {
        Ok(self.pactl.sources()?)
    }

    fn sink_inputs(&self) -> soundwarden_core::Result<Vec<SinkInputInfo>> {
        Ok(self.pactl.sink_inputs()?)
    }

    fn set_card_profile(&self, card: u32, profile: &str) -> soundwarden_core::Result<()> {
        Ok(self.pactl.execute(&pactl::set_card_profile_args(card, profile))?)
    }

    fn set_port(&self, direction: Direction, index: u32, port: &str) -> soundwarden_core::Result<()> {
        Ok(self.pactl.execute(&pactl::set_port_args(direction, index, port))?)
    }

    fn set_default(&self, direction: Direction, name: &str) -> soundwarden_core::Result<()> {
        Ok(self.pactl.execute(&pactl::set_default_args(direction, name))?)
    }

    fn set_volume(&self, direction: Direction, index: u32, volume: &ChannelVolume) -> soundwarden_core::Result<()> {
        Ok(self.pactl.execute(&pactl::set_volume_args(direction, index, volume))?)
    }

    fn set_mute(&self, direction: Direction, index: u32, muted: bool) -> soundwarden_core::Result<()> {
        Ok(self.pactl.execute(&pactl::set_mute_args(direction, index, muted))?)
    }

    fn move_sink_inputs(&self, inputs: &[u32], sink: u32) -> soundwarden_core::Result<()> {
        let mut first_error = None;
        for &input in inputs {
            if let Err(e) = self.pactl.execute(&pactl::move_sink_input_args(input, sink)) {
                warn!(input, sink, error = %e, "Failed to move sink input");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
