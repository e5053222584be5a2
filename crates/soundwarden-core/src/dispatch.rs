//! Event Dispatcher: drains the backend's event and state channels.
//!
//! Each channel gets its own task. Engine calls block on backend round
//! trips, so they run on the blocking pool; the engine's switch lock keeps
//! event handling, switches and re-initialization mutually exclusive.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{BackendEvent, EventKind, Facility, ServerState};
use crate::device::Direction;
use crate::engine::AudioEngine;

impl AudioEngine {
    /// Apply one backend change notification to the mirror.
    ///
    /// Events arriving while the engine is not live are dropped; the next
    /// initialization rebuilds everything from snapshots anyway.
    pub fn handle_event(&self, event: BackendEvent) {
        let _serial = self.switch_lock.lock();
        if !self.state().is_live() {
            debug!(?event, state = ?self.state(), "Dropping backend event");
            return;
        }
        trace!(?event, "Handling backend event");

        let BackendEvent { facility, kind, index } = event;
        match facility {
            Facility::Card => {
                // Port availability lives on the endpoints too.
                self.refresh_cards();
                self.refresh_endpoints(Direction::Sink);
                self.refresh_endpoints(Direction::Source);
                self.fix_active_port_not_available();
                for direction in [Direction::Sink, Direction::Source] {
                    self.auto_switch_port(direction);
                }
                self.refresh_bluetooth();
            }
            Facility::Sink | Facility::Source => {
                let direction = if facility == Facility::Sink { Direction::Sink } else { Direction::Source };
                if kind == EventKind::Remove {
                    self.remove_endpoint(direction, index);
                    return;
                }
                self.sync_endpoint(direction, index);
                if kind == EventKind::New
                    && let Err(e) = self.resolve_default(direction)
                {
                    warn!(%direction, index, error = %e, "Failed to resolve default endpoint");
                }
            }
            Facility::SinkInput => {
                if kind == EventKind::Remove {
                    self.remove_sink_input(index);
                    return;
                }
                match self.backend.sink_input_by_index(index) {
                    Ok(Some(info)) => self.upsert_sink_input(info),
                    Ok(None) => self.remove_sink_input(index),
                    Err(e) => warn!(index, error = %e, "Failed to fetch sink input"),
                }
            }
            Facility::Server => {
                self.refresh_defaults();
                self.refresh_bluetooth();
            }
        }
    }
}

/// Handles of the two consumer tasks.
pub struct Dispatcher {
    events: JoinHandle<()>,
    states: JoinHandle<()>,
}

impl Dispatcher {
    /// Start consuming `events` and `states`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        engine: Arc<AudioEngine>,
        mut events: mpsc::Receiver<BackendEvent>,
        mut states: mpsc::Receiver<ServerState>,
    ) -> Self {
        let event_engine = Arc::clone(&engine);
        let events = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let engine = Arc::clone(&event_engine);
                if let Err(e) = tokio::task::spawn_blocking(move || engine.handle_event(event)).await {
                    error!(?event, error = %e, "Event handler panicked");
                }
            }
            debug!("Backend event channel closed");
        });

        let states = tokio::spawn(async move {
            while let Some(state) = states.recv().await {
                info!(?state, "Backend state changed");
                let engine = Arc::clone(&engine);
                if let Err(e) = tokio::task::spawn_blocking(move || engine.handle_server_state(state)).await {
                    error!(?state, error = %e, "State handler panicked");
                }
            }
            debug!("Backend state channel closed");
        });

        Self { events, states }
    }

    /// Wait for both channels to close.
    pub async fn join(self) {
        let _ = self.events.await;
        let _ = self.states.await;
    }

    pub fn abort(&self) {
        self.events.abort();
        self.states.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::Availability;
    use crate::properties::{endpoint_path, sink_input_path};
    use crate::state::EngineState;
    use crate::store::MemoryStore;
    use crate::testing::{FakeBackend, engine_with, laptop_card, live_engine};

    #[test]
    fn test_events_dropped_when_not_live() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = engine_with(&fake);

        engine.handle_event(BackendEvent::new(Facility::Card, EventKind::New, 0));
        assert!(engine.graph.lock().cards.is_empty());
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_headphone_unplug_event_recovers() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = live_engine(&fake, Arc::new(MemoryStore::new()));

        fake.set_availability(0, "analog-output-headphones", Direction::Sink, Availability::No);
        engine.handle_event(BackendEvent::new(Facility::Card, EventKind::Change, 0));

        let sink = fake.endpoint_of_card(Direction::Sink, 0).expect("Expected a sink");
        assert_eq!(sink.active_port.as_deref(), Some("analog-output-speaker"));
        assert_eq!(engine.properties().default_sink, endpoint_path(Direction::Sink, sink.index));
    }

    #[test]
    fn test_sink_input_lifecycle() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = live_engine(&fake, Arc::new(MemoryStore::new()));
        let sink = fake.endpoint_of_card(Direction::Sink, 0).expect("Expected a sink");

        fake.add_sink_input(7, sink.index);
        engine.handle_event(BackendEvent::new(Facility::SinkInput, EventKind::New, 7));
        assert!(engine.properties().sink_inputs.contains(&sink_input_path(7)));

        engine.handle_event(BackendEvent::new(Facility::SinkInput, EventKind::Remove, 7));
        assert!(!engine.properties().sink_inputs.contains(&sink_input_path(7)));
    }

    #[test]
    fn test_endpoint_remove_clears_default() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = live_engine(&fake, Arc::new(MemoryStore::new()));
        let sink = fake.endpoint_of_card(Direction::Sink, 0).expect("Expected a sink");

        engine.handle_event(BackendEvent::new(Facility::Sink, EventKind::Remove, sink.index));
        assert_eq!(engine.properties().default_sink, "/");
        assert!(engine.graph.lock().default_index(Direction::Sink).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatcher_drives_lifecycle() {
        let fake = Arc::new(FakeBackend::new());
        fake.plug_card(laptop_card(0));
        let engine = Arc::new(engine_with(&fake));
        let (event_tx, event_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::spawn(Arc::clone(&engine), event_rx, state_rx);

        state_tx.send(ServerState::Connected).await.expect("Failed to send state");
        drop(state_tx);
        // Wait for the state task first so the event is handled while live.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while engine.state() != EngineState::Running {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Engine never became live");

        fake.set_availability(0, "analog-output-headphones", Direction::Sink, Availability::No);
        event_tx
            .send(BackendEvent::new(Facility::Card, EventKind::Change, 0))
            .await
            .expect("Failed to send event");
        drop(event_tx);
        dispatcher.join().await;

        assert_eq!(engine.epoch(), 1);
        let sink = fake.endpoint_of_card(Direction::Sink, 0).expect("Expected a sink");
        assert_eq!(sink.active_port.as_deref(), Some("analog-output-speaker"));
    }
}
