//! SoundWarden IPC - Unix socket protocol and client library.
//!
//! Newline-delimited JSON: clients send [`Request`]s, the daemon answers with
//! [`Response`]s and pushes [`Event`]s for property changes.

pub mod client;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use events::{Event, EventType};
pub use messages::{ErrorInfo, Method, Request, Response, error_code};
pub use server::{IpcServer, PendingRequest};

use std::path::PathBuf;

use futures::{Sink, SinkExt};
use serde::Serialize;
use tokio_util::codec::LinesCodecError;

/// Longest accepted line, in bytes.
pub(crate) const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/soundwarden/daemon.sock` or falls back to
/// `/run/user/$UID/soundwarden/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("soundwarden/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/soundwarden/daemon.sock"))
    }
}

/// Write `value` as one JSON line.
pub(crate) async fn send_json<S, T>(sink: &mut S, value: &T) -> IpcResult<()>
where
    S: Sink<String, Error = LinesCodecError> + Unpin,
    T: Serialize,
{
    sink.send(serde_json::to_string(value)?).await?;
    Ok(())
}
