//! IPC client implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::SplitSink;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, warn};

use crate::error::{IpcError, IpcResult};
use crate::events::Event;
use crate::messages::{Method, Request, Response};
use crate::{MAX_LINE_LENGTH, send_json};

/// How long [`IpcClient::request`] waits for the daemon.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// A line from the daemon: either an answer or a pushed event.
#[derive(Deserialize)]
#[serde(untagged)]
enum Incoming {
    Response(Response),
    Event(Event),
}

/// IPC client for connecting to the SoundWarden daemon.
pub struct IpcClient {
    writer: Mutex<SplitSink<Framed<UnixStream, LinesCodec>, String>>,
    next_id: AtomicU64,
    pending: Pending,
    event_rx: mpsc::Receiver<Event>,
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (writer, mut lines) = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)).split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(64);

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                };
                match serde_json::from_str::<Incoming>(&line) {
                    Ok(Incoming::Response(response)) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&response.id) {
                            let _ = tx.send(response);
                        } else {
                            debug!(id = response.id, "Response for unknown request");
                        }
                    }
                    Ok(Incoming::Event(event)) => {
                        let _ = event_tx.send(event).await;
                    }
                    Err(e) => warn!(error = %e, "Unknown message format"),
                }
            }
            debug!("Connection closed");
            // Fail everything still waiting
            reader_pending.lock().await.clear();
        });

        Ok(Self { writer: Mutex::new(writer), next_id: AtomicU64::new(1), pending, event_rx })
    }

    /// Connect to the daemon at the default socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect_default() -> IpcResult<Self> {
        Self::connect(&crate::socket_path()).await
    }

    /// Send a request and wait for its response envelope.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent, the connection
    /// closes, or no response arrives in time.
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = send_json(&mut *self.writer.lock().await, &Request { id, method }).await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpcError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Send a request and unwrap its result.
    ///
    /// # Errors
    /// As [`IpcClient::request`], plus [`IpcError::Server`] when the daemon
    /// answered with an error.
    pub async fn call(&self, method: Method) -> IpcResult<Value> {
        self.request(method)
            .await?
            .result
            .map_err(|e| IpcError::Server { code: e.code, message: e.message })
    }

    /// Receiver for pushed events.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.event_rx
    }
}
