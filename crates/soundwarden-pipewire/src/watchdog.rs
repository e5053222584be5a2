//! Server-state stream from a native PipeWire connection.
//!
//! The connection lives on a dedicated thread because PipeWire objects are
//! not thread-safe. It reports `Connected` once the core is up and
//! `Disconnected` when the main loop exits, then reconnects after a delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pipewire::context::ContextRc;
use pipewire::main_loop::MainLoopRc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use soundwarden_core::ServerState;

use crate::error::{PwError, PwResult};

/// Object id of the PipeWire core.
const PW_ID_CORE: u32 = 0;
/// Broken pipe: the server went away.
const EPIPE: i32 = 32;

/// Handle to stop the watchdog thread.
pub struct Watchdog {
    stop: Arc<AtomicBool>,
    wake: pipewire::channel::Sender<()>,
}

impl Watchdog {
    /// Start the watchdog thread.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(states: mpsc::Sender<ServerState>, retry: Duration) -> PwResult<Self> {
        let (wake, wake_rx) = pipewire::channel::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        std::thread::Builder::new()
            .name("pipewire-watchdog".to_string())
            .spawn(move || run(&states, wake_rx, &thread_stop, retry))
            .map_err(|e| PwError::MainLoopError(format!("Failed to spawn watchdog thread: {e}")))?;

        Ok(Self { stop, wake })
    }

    /// Ask the thread to quit its main loop and exit.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
    }
}

fn run(
    states: &mpsc::Sender<ServerState>,
    mut wake: pipewire::channel::Receiver<()>,
    stop: &AtomicBool,
    retry: Duration,
) {
    pipewire::init();

    while !stop.load(Ordering::SeqCst) {
        let main_loop = match MainLoopRc::new(None) {
            Ok(main_loop) => main_loop,
            Err(e) => {
                error!(error = %e, "Failed to create PipeWire main loop");
                break;
            }
        };
        let quit_loop = main_loop.clone();
        let attached = wake.attach(main_loop.loop_(), move |()| quit_loop.quit());

        if let Err(e) = watch_session(&main_loop, states) {
            warn!(error = %e, "PipeWire session failed");
        }
        wake = attached.deattach();

        if stop.load(Ordering::SeqCst) {
            break;
        }
        debug!(retry_ms = retry.as_millis(), "Reconnecting to PipeWire");
        sleep_unless_stopped(retry, stop);
    }
    info!("PipeWire watchdog exiting");
}

/// Connect, report, and block until the connection is lost.
fn watch_session(main_loop: &MainLoopRc, states: &mpsc::Sender<ServerState>) -> PwResult<()> {
    let context = ContextRc::new(main_loop, None)
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to create context: {e}")))?;
    let core = context
        .connect_rc(None)
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to connect: {e}")))?;

    let lost = main_loop.clone();
    let _listener = core
        .add_listener_local()
        .error(move |id, seq, res, message| {
            if id == PW_ID_CORE && res == -EPIPE {
                warn!(seq, message, "PipeWire connection lost");
                lost.quit();
            } else {
                debug!(id, seq, res, message, "PipeWire core error");
            }
        })
        .register();

    info!("Connected to PipeWire");
    let _ = states.blocking_send(ServerState::Connected);
    main_loop.run();
    info!("PipeWire main loop exited");
    let _ = states.blocking_send(ServerState::Disconnected);
    Ok(())
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
