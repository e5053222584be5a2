//! The reconciliation engine: owns the mirror, the policy services and the
//! exported properties.
//!
//! Lock order is `switch_lock` → `graph` → property writer. The graph lock
//! is only held for short reads and writes, never across a backend call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::{Backend, ServerState};
use crate::device::Direction;
use crate::error::{Error, Result};
use crate::graph::DeviceGraph;
use crate::keeper::{ConfigKeeper, VolumeDefaults};
use crate::priority::PriorityManager;
use crate::properties::{Properties, PropertyChange, PropertyStore};
use crate::state::{Diagnostics, EngineState};
use crate::store::PolicyStore;

/// Tunables supplied by the daemon configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Priority-based automatic port selection
    pub auto_switch: bool,
    pub volume: VolumeDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { auto_switch: true, volume: VolumeDefaults::default() }
    }
}

/// Audio device and routing policy engine.
pub struct AudioEngine {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) store: Arc<dyn PolicyStore>,
    pub(crate) keeper: ConfigKeeper,
    pub(crate) priorities: PriorityManager,
    pub(crate) graph: Mutex<DeviceGraph>,
    pub(crate) props: PropertyStore,
    /// Serializes port/profile transitions with event application. Reentrant
    /// so that event handling can trigger a switch on the same thread.
    pub(crate) switch_lock: ReentrantMutex<()>,
    pub(crate) auto_switch: bool,
    state: RwLock<EngineState>,
    epoch: AtomicU64,
    output_switches: AtomicU32,
    input_switches: AtomicU32,
}

impl AudioEngine {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn PolicyStore>, config: EngineConfig) -> Self {
        Self {
            keeper: ConfigKeeper::new(store.clone(), config.volume),
            priorities: PriorityManager::new(store.clone()),
            backend,
            store,
            graph: Mutex::new(DeviceGraph::default()),
            props: PropertyStore::new(),
            switch_lock: ReentrantMutex::new(()),
            auto_switch: config.auto_switch,
            state: RwLock::new(EngineState::Initializing),
            epoch: AtomicU64::new(0),
            output_switches: AtomicU32::new(0),
            input_switches: AtomicU32::new(0),
        }
    }

    /// Current exported snapshot.
    pub fn properties(&self) -> Arc<Properties> {
        self.props.load()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChange> {
        self.props.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(?previous, ?state, "Engine state changed");
            self.props.notify(PropertyChange::BackendState { state });
        }
    }

    /// Fail with [`Error::NotReady`] unless the mirror is populated.
    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.state().is_live() { Ok(()) } else { Err(Error::NotReady) }
    }

    /// React to a backend connectivity change.
    pub fn handle_server_state(&self, state: ServerState) {
        match state {
            ServerState::Connected => {
                if self.state().is_live() {
                    debug!("Backend connected while already live");
                } else {
                    self.initialize();
                }
            }
            ServerState::Disconnected => self.teardown(),
        }
    }

    /// Cold initialization of a new epoch.
    pub fn initialize(&self) {
        let _serial = self.switch_lock.lock();
        if self.state() == EngineState::ShuttingDown {
            return;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        info!(epoch, "Reconciling with audio backend");
        self.set_state(EngineState::Reconciling);

        self.refresh();
        for direction in [Direction::Sink, Direction::Source] {
            self.resume_default_config(direction);
            self.auto_switch_port(direction);
        }
        self.fix_active_port_not_available();
        self.move_sink_inputs_to_default();
        self.refresh_bluetooth();

        self.set_state(EngineState::Running);
        let counts = self.graph.lock().counts();
        info!(
            epoch,
            cards = counts.cards,
            sinks = counts.sinks,
            sources = counts.sources,
            sink_inputs = counts.sink_inputs,
            "Audio engine running"
        );
    }

    /// Unexport everything and forget the mirror.
    pub fn teardown(&self) {
        let _serial = self.switch_lock.lock();
        if !self.state().is_live() {
            return;
        }
        warn!(epoch = self.epoch(), "Audio backend disconnected, tearing down mirror");
        self.graph.lock().clear();
        self.props.clear();
        if self.state() != EngineState::ShuttingDown {
            self.set_state(EngineState::BackendDisconnected);
        }
    }

    /// Discard the current epoch and rebuild from scratch.
    pub fn reinitialize(&self) {
        let _serial = self.switch_lock.lock();
        self.teardown();
        self.initialize();
    }

    pub fn shutdown(&self) {
        info!("Audio engine shutting down");
        self.set_state(EngineState::ShuttingDown);
    }

    /// Whether (card, port) is enabled by policy.
    ///
    /// # Errors
    /// [`Error::CardNotFound`] if the card is not mirrored.
    pub fn is_port_enabled(&self, card: u32, port: &str) -> Result<bool> {
        let name = self.graph.lock().card_name(card).map(str::to_string).ok_or(Error::CardNotFound(card))?;
        Ok(self.keeper.is_port_enabled(&name, port))
    }

    pub(crate) fn switch_counter(&self, direction: Direction) -> &AtomicU32 {
        match direction {
            Direction::Sink => &self.output_switches,
            Direction::Source => &self.input_switches,
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            state: self.state(),
            epoch: self.epoch(),
            mirror: self.graph.lock().counts(),
            output_auto_switch_count: self.output_switches.load(Ordering::Relaxed),
            input_auto_switch_count: self.input_switches.load(Ordering::Relaxed),
            output_priorities: self.priorities.order(Direction::Sink),
            input_priorities: self.priorities.order(Direction::Source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeBackend, engine_with, laptop_card};

    #[test]
    fn test_lifecycle_transitions() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = engine_with(&fake);
        assert_eq!(engine.state(), EngineState::Initializing);
        assert!(engine.ensure_live().is_err());

        engine.handle_server_state(ServerState::Connected);
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.epoch(), 1);
        assert_eq!(engine.diagnostics().mirror.sinks, 1);

        // A second connect while live is ignored.
        engine.handle_server_state(ServerState::Connected);
        assert_eq!(engine.epoch(), 1);

        engine.handle_server_state(ServerState::Disconnected);
        assert_eq!(engine.state(), EngineState::BackendDisconnected);
        assert_eq!(engine.diagnostics().mirror.sinks, 0);
        assert!(engine.properties().objects.is_empty());

        engine.handle_server_state(ServerState::Connected);
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.epoch(), 2);
    }

    #[test]
    fn test_initialize_with_server_default_completes() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let sink = fake.endpoint_of_card(Direction::Sink, 0).expect("Expected a sink");
        let source = fake.endpoint_of_card(Direction::Source, 0).expect("Expected a source");
        fake.set_server_default(Direction::Sink, &sink.name);
        fake.set_server_default(Direction::Source, &source.name);
        fake.add_sink_input(7, 999);
        let engine = Arc::new(engine_with(&fake));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&engine);
        std::thread::spawn(move || {
            worker.initialize();
            let _ = done_tx.send(());
        });
        done_rx.recv_timeout(Duration::from_secs(5)).expect("Failed to initialize within 5 seconds");

        assert_eq!(engine.state(), EngineState::Running);
        let default = engine.graph.lock().default_index(Direction::Sink);
        assert!(default.is_some());
        assert!(fake.inputs().iter().all(|i| Some(i.sink) == default));
    }

    #[test]
    fn test_is_port_enabled_unknown_card() {
        let fake = Arc::new(FakeBackend::new());
        let engine = engine_with(&fake);
        assert!(matches!(engine.is_port_enabled(9, "speaker"), Err(Error::CardNotFound(9))));
    }
}
