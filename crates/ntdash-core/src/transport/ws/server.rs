//! WebSocket table server
//!
//! Holds the authoritative entries, sends a snapshot to every peer that
//! joins and broadcasts each put/delete to all peers (the writer included).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::message::{ClientMessage, Entry, ServerMessage, PROTOCOL_V1};
use crate::error::{NtError, NtResult};
use crate::path;
use crate::value::Value;

/// How long a peer has to send its hello
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered updates per peer before it has to resync
const UPDATE_BUFFER: usize = 256;

/// A bound table server
pub struct WsTableServer {
    listener: TcpListener,
    handle: ServerHandle,
}

/// Shared access to a running server's entries
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<ServerShared>,
}

struct ServerShared {
    server_id: String,
    entries: Mutex<BTreeMap<String, Value>>,
    updates: broadcast::Sender<ServerMessage>,
}

impl WsTableServer {
    /// Bind the server to `addr`
    pub async fn bind(addr: impl ToSocketAddrs) -> NtResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let server_id = format!("ntdash-server-{}", &uuid::Uuid::new_v4().to_string()[..8]);

        Ok(Self {
            listener,
            handle: ServerHandle {
                shared: Arc::new(ServerShared {
                    server_id,
                    entries: Mutex::new(BTreeMap::new()),
                    updates,
                }),
            },
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> NtResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for reading and writing entries server-side
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accept peers until the listener fails
    pub async fn run(self) -> NtResult<()> {
        info!(
            "Table server {} listening on {}",
            self.handle.shared.server_id,
            self.local_addr()?
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let shared = self.handle.shared.clone();
            tokio::spawn(async move {
                match serve_peer(stream, peer, shared).await {
                    Ok(()) => debug!("Peer {} disconnected", peer),
                    Err(e) => warn!("Peer {} failed: {}", peer, e),
                }
            });
        }
    }
}

impl ServerHandle {
    /// Server identifier sent in the welcome message
    pub fn server_id(&self) -> &str {
        &self.shared.server_id
    }

    /// Write a value and broadcast it
    pub fn put(&self, path: &str, value: impl Into<Value>) {
        self.shared.put(path.to_string(), value.into());
    }

    /// Remove a value and broadcast the removal
    pub fn delete(&self, path: &str) {
        self.shared.delete(path);
    }

    /// Current value at `path`
    pub fn get(&self, path: &str) -> Value {
        self.shared
            .lock()
            .get(path::normalize_table(path))
            .cloned()
            .unwrap_or_default()
    }

    /// Every entry the server holds
    pub fn entries(&self) -> BTreeMap<String, Value> {
        self.shared.lock().clone()
    }
}

impl ServerShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, path: String, value: Value) {
        let path = path::normalize_table(&path).to_string();
        if !value.is_assigned() {
            self.delete(&path);
            return;
        }

        let mut entries = self.lock();
        if entries.get(&path) == Some(&value) {
            return;
        }
        entries.insert(path.clone(), value.clone());
        // Sent under the lock so broadcast order matches store order
        let _ = self.updates.send(ServerMessage::Update { path, value });
    }

    fn delete(&self, path: &str) {
        let path = path::normalize_table(path);
        let mut entries = self.lock();
        if entries.remove(path).is_some() {
            let _ = self.updates.send(ServerMessage::Delete {
                path: path.to_string(),
            });
        }
    }

    /// Subscribe to updates and take a snapshot atomically
    fn join(&self) -> (broadcast::Receiver<ServerMessage>, ServerMessage) {
        let entries = self.lock();
        let updates = self.updates.subscribe();
        let snapshot = ServerMessage::Snapshot {
            entries: entries
                .iter()
                .map(|(path, value)| Entry {
                    path: path.clone(),
                    value: value.clone(),
                })
                .collect(),
        };
        (updates, snapshot)
    }
}

async fn serve_peer(stream: TcpStream, peer: SocketAddr, shared: Arc<ServerShared>) -> NtResult<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let client_id = wait_for_hello(&mut read).await?;
    let Some(client_id) = client_id else {
        let reply = ServerMessage::Error {
            message: format!("Unsupported protocol, expected version {}", PROTOCOL_V1),
        };
        write.send(Message::Binary(reply.encode()?)).await?;
        write.close().await.ok();
        return Ok(());
    };

    info!("Peer {} joined as {}", peer, client_id);
    write
        .send(Message::Binary(ServerMessage::welcome(&shared.server_id).encode()?))
        .await?;

    let (mut updates, snapshot) = shared.join();
    write.send(Message::Binary(snapshot.encode()?)).await?;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match ClientMessage::decode(&data) {
                        Ok(ClientMessage::Put { path, value }) => shared.put(path, value),
                        Ok(ClientMessage::Delete { path }) => shared.delete(&path),
                        Ok(ClientMessage::Hello { .. }) => {}
                        Err(e) => warn!("Failed to decode message from {}: {}", peer, e),
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    _ => {}
                }
            }

            update = updates.recv() => {
                match update {
                    Ok(msg) => write.send(Message::Binary(msg.encode()?)).await?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Peer {} lagged by {} updates, resending snapshot", peer, skipped);
                        let (fresh, snapshot) = shared.join();
                        updates = fresh;
                        write.send(Message::Binary(snapshot.encode()?)).await?;
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

/// Wait for the peer's hello; `None` if it speaks no version we support
async fn wait_for_hello(
    read: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
) -> NtResult<Option<String>> {
    tokio::time::timeout(HELLO_TIMEOUT, read_hello(read))
        .await
        .map_err(|_| NtError::Transport("Timeout waiting for peer hello".to_string()))?
}

async fn read_hello(
    read: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
) -> NtResult<Option<String>> {
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Binary(data) => match ClientMessage::decode(&data) {
                Ok(ClientMessage::Hello {
                    client_id,
                    supported_protocol_versions,
                }) => {
                    let supported = supported_protocol_versions
                        .iter()
                        .any(|v| v == PROTOCOL_V1);
                    return Ok(supported.then_some(client_id));
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to decode hello: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    Err(NtError::Transport(
        "Peer closed connection during handshake".to_string(),
    ))
}
