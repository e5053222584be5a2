//! IPC server implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::error::IpcResult;
use crate::events::{Event, EventType};
use crate::messages::{ErrorInfo, Method, Request, Response};
use crate::{MAX_LINE_LENGTH, send_json};

/// A request waiting for the daemon to answer it.
#[derive(Debug)]
pub struct PendingRequest {
    pub client_id: u64,
    pub request: Request,
    /// Where to send the response
    pub reply: mpsc::Sender<Response>,
}

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    request_tx: mpsc::Sender<PendingRequest>,
}

/// Event types a client receives. `None` means everything.
#[derive(Debug, Default)]
struct Subscriptions(Option<HashSet<EventType>>);

impl Subscriptions {
    fn wants(&self, event: EventType) -> bool {
        self.0.as_ref().is_none_or(|set| set.contains(&event))
    }

    fn subscribe(&mut self, events: &[EventType]) {
        if events.is_empty() {
            self.0 = None;
            return;
        }
        self.0.get_or_insert_with(HashSet::new).extend(events.iter().copied());
    }

    fn unsubscribe(&mut self, events: &[EventType]) {
        let set = self.0.get_or_insert_with(|| EventType::ALL.into_iter().collect());
        for event in events {
            set.remove(event);
        }
    }
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<PendingRequest>)> {
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stale socket from a previous run
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((
            Self {
                listener,
                path: socket_path.to_path_buf(),
                next_client_id: AtomicU64::new(1),
                event_tx,
                request_tx,
            },
            request_rx,
        ))
    }

    /// Accept connections forever.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let event_rx = self.event_tx.subscribe();
                    let request_tx = self.request_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(client_id, stream, event_rx, request_tx).await {
                            error!(client_id, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    /// Broadcast an event to all subscribed clients.
    pub fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Event sender for broadcasting from other tasks.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Failed to remove socket");
        }
    }
}

async fn handle_client(
    client_id: u64,
    stream: UnixStream,
    mut event_rx: broadcast::Receiver<Event>,
    request_tx: mpsc::Sender<PendingRequest>,
) -> IpcResult<()> {
    let (mut sink, mut lines) = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)).split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Response>(16);
    let mut subscriptions = Subscriptions::default();

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let request = match serde_json::from_str::<Request>(&line) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(client_id, error = %e, "Invalid request format");
                            send_json(&mut sink, &Response::err(0, ErrorInfo::invalid_request(e.to_string()))).await?;
                            continue;
                        }
                    };
                    debug!(client_id, request_id = request.id, method = ?request.method, "Received request");
                    match &request.method {
                        Method::Subscribe { events } => {
                            subscriptions.subscribe(events);
                            send_json(&mut sink, &Response::ok(request.id, Value::Null)).await?;
                        }
                        Method::Unsubscribe { events } => {
                            subscriptions.unsubscribe(events);
                            send_json(&mut sink, &Response::ok(request.id, Value::Null)).await?;
                        }
                        _ => {
                            let pending = PendingRequest { client_id, request, reply: reply_tx.clone() };
                            if request_tx.send(pending).await.is_err() {
                                warn!(client_id, "Request handler gone");
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(client_id, error = %e, "Read error");
                    break;
                }
                None => {
                    debug!(client_id, "Client disconnected");
                    break;
                }
            },

            Some(response) = reply_rx.recv() => {
                send_json(&mut sink, &response).await?;
            }

            event = event_rx.recv() => match event {
                Ok(event) => {
                    if subscriptions.wants(event.event) {
                        send_json(&mut sink, &event).await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(client_id, skipped, "Client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!(client_id, "Client handler exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio_test::assert_ok;

    use soundwarden_core::{Direction, PropertyChange};

    use super::*;
    use crate::client::IpcClient;
    use crate::error::IpcError;

    async fn start(dir: &tempfile::TempDir) -> (Arc<IpcServer>, PathBuf) {
        let path = dir.path().join("run").join("daemon.sock");
        let (server, mut requests) = IpcServer::bind(&path).await.expect("Failed to bind");
        let server = Arc::new(server);

        let accept = Arc::clone(&server);
        tokio::spawn(async move { accept.run().await });

        // Stand-in for the daemon's request handler
        tokio::spawn(async move {
            while let Some(pending) = requests.recv().await {
                let id = pending.request.id;
                let response = match pending.request.method {
                    Method::GetState => Response::ok(id, json!({ "default_sink": "/" })),
                    Method::SetPort { .. } => Response::err(id, ErrorInfo::new(403, "port is disabled")),
                    _ => Response::ok(id, Value::Null),
                };
                let _ = pending.reply.send(response).await;
            }
        });

        (server, path)
    }

    #[tokio::test]
    async fn test_request_response() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (_server, path) = start(&dir).await;
        let client = IpcClient::connect(&path).await.expect("Failed to connect");

        let state = assert_ok!(client.call(Method::GetState).await);
        assert_eq!(state["default_sink"], json!("/"));

        let rejected = client
            .call(Method::SetPort { card: 1, port: "hdmi-output-0".into(), direction: Direction::Sink })
            .await;
        assert!(matches!(rejected, Err(IpcError::Server { code: 403, .. })));
    }

    #[tokio::test]
    async fn test_events_follow_subscriptions() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (server, path) = start(&dir).await;
        let mut client = IpcClient::connect(&path).await.expect("Failed to connect");

        assert_ok!(client.call(Method::Subscribe { events: vec![EventType::PortEnabledChanged] }).await);

        let cards = Event::from_change(&PropertyChange::Cards).expect("Failed to build event");
        let enabled = Event::from_change(&PropertyChange::PortEnabled {
            card: 47,
            port: "analog-input-mic".into(),
            enabled: false,
        })
        .expect("Failed to build event");
        server.broadcast(cards);
        server.broadcast(enabled.clone());

        let received = tokio::time::timeout(Duration::from_secs(5), client.events().recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Event stream closed");
        assert_eq!(received, enabled);
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (_server, path) = start(&dir).await;
        let mut stream = UnixStream::connect(&path).await.expect("Failed to connect");

        stream.write_all(b"{\"id\": 1, \"method\": \n").await.expect("Failed to write");
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("Failed to read");

        let response: Response = serde_json::from_str(&line).expect("Failed to parse response");
        assert_eq!(response.id, 0);
        assert_eq!(response.result.map_err(|e| e.code), Err(400));
    }

    #[tokio::test]
    async fn test_socket_removed_on_drop() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("daemon.sock");
        let (server, _requests) = IpcServer::bind(&path).await.expect("Failed to bind");
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }

    #[test]
    fn test_subscriptions() {
        let mut subs = Subscriptions::default();
        assert!(subs.wants(EventType::CardsChanged));

        subs.subscribe(&[EventType::DefaultSinkChanged]);
        assert!(subs.wants(EventType::DefaultSinkChanged));
        assert!(!subs.wants(EventType::CardsChanged));

        subs.subscribe(&[]);
        subs.unsubscribe(&[EventType::ObjectChanged]);
        assert!(!subs.wants(EventType::ObjectChanged));
        assert!(subs.wants(EventType::StateChanged));
    }
}
