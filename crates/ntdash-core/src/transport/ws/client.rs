//! WebSocket table client
//!
//! Each [`WsConnector::open`] spawns one connection task that performs the
//! handshake, keeps the local mirror up to date and forwards local writes.
//! The client counts as connected once the server's snapshot has arrived.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::message::{ClientMessage, ServerMessage};
use crate::error::{NtError, NtResult};
use crate::protocol::{
    ClientOptions, ConnectionListener, ConnectionNotice, Connector, Table, TableClient,
};
use crate::transport::mirror::{Mirror, MirrorTable, Upstream};
use crate::value::Value;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the server has to answer our hello
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections to a table server
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }

    /// Server URL for the given options
    pub fn url(options: &ClientOptions) -> String {
        format!("ws://{}:{}/", options.address, options.port)
    }
}

impl Connector for WsConnector {
    fn open(
        &self,
        options: &ClientOptions,
        on_connection: ConnectionListener,
    ) -> Arc<dyn TableClient> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ClientShared {
            mirror: Arc::new(Mirror::new()),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            outgoing: outgoing_tx,
        });

        tokio::spawn(connection_task(
            Self::url(options),
            options.client_id.clone(),
            shared.clone(),
            outgoing_rx,
            on_connection,
        ));

        Arc::new(WsTableClient { shared })
    }
}

struct ClientShared {
    mirror: Arc<Mirror>,
    connected: AtomicBool,
    closed: AtomicBool,
    shutdown: Notify,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl Upstream for ClientShared {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn send_put(&self, path: &str, value: Value) -> bool {
        self.outgoing
            .send(ClientMessage::Put {
                path: path.to_string(),
                value,
            })
            .is_ok()
    }

    fn send_delete(&self, path: &str) -> bool {
        self.outgoing
            .send(ClientMessage::Delete {
                path: path.to_string(),
            })
            .is_ok()
    }
}

/// Client handle opened by [`WsConnector`]
pub struct WsTableClient {
    shared: Arc<ClientShared>,
}

impl TableClient for WsTableClient {
    fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    fn table(&self, name: &str) -> Arc<dyn Table> {
        Arc::new(MirrorTable::new(
            name,
            self.shared.mirror.clone(),
            self.shared.clone(),
        ))
    }

    fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.mirror.clear_listeners();
        self.shared.shutdown.notify_one();
    }
}

/// Run one connection until it closes, fails or is shut down
async fn connection_task(
    url: String,
    client_id: String,
    shared: Arc<ClientShared>,
    outgoing_rx: mpsc::UnboundedReceiver<ClientMessage>,
    on_connection: ConnectionListener,
) {
    let result = tokio::select! {
        result = serve_connection(&url, &client_id, &shared, outgoing_rx, &on_connection) => result,
        _ = shared.shutdown.notified() => {
            debug!("Table client for {} shut down", url);
            return;
        }
    };

    if let Err(e) = result {
        warn!("Table connection to {} failed: {}", url, e);
    }

    if shared.connected.swap(false, Ordering::SeqCst) && !shared.closed.load(Ordering::SeqCst) {
        on_connection(ConnectionNotice {
            remote: None,
            connected: false,
        });
    }
}

async fn serve_connection(
    url: &str,
    client_id: &str,
    shared: &ClientShared,
    mut outgoing_rx: mpsc::UnboundedReceiver<ClientMessage>,
    on_connection: &ConnectionListener,
) -> NtResult<()> {
    debug!("Connecting to {}", url);
    let (ws_stream, _response) = connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Binary(ClientMessage::hello(client_id).encode()?))
        .await?;

    let server_id = wait_for_welcome(&mut read, url).await?;
    info!("Table server {} accepted {} as {}", server_id, url, client_id);

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(msg) => write.send(Message::Binary(msg.encode()?)).await?,
                    None => {
                        write.close().await.ok();
                        return Ok(());
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match ServerMessage::decode(&data) {
                        Ok(ServerMessage::Snapshot { entries }) => {
                            shared
                                .mirror
                                .replace_all(entries.into_iter().map(|e| (e.path, e.value)));
                            if !shared.connected.swap(true, Ordering::SeqCst) {
                                on_connection(ConnectionNotice {
                                    remote: Some(server_id.clone()),
                                    connected: true,
                                });
                            }
                        }
                        Ok(ServerMessage::Update { path, value }) => {
                            shared.mirror.apply(&path, value, false);
                        }
                        Ok(ServerMessage::Delete { path }) => {
                            shared.mirror.remove(&path, false);
                        }
                        Ok(ServerMessage::Error { message }) => {
                            warn!("Table server error: {}", message);
                        }
                        Ok(ServerMessage::Welcome { .. }) => {}
                        Err(e) => {
                            warn!("Failed to decode server message: {}", e);
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    _ => {}
                }
            }
        }
    }
}

/// Wait for the server's handshake response
async fn wait_for_welcome(
    read: &mut futures_util::stream::SplitStream<WsStream>,
    url: &str,
) -> NtResult<String> {
    let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(NtError::Transport(format!(
                "Timeout waiting for table server response ({})",
                url
            )));
        }

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match ServerMessage::decode(&data) {
                        Ok(ServerMessage::Welcome { server_id, .. }) => return Ok(server_id),
                        Ok(ServerMessage::Error { message }) => {
                            return Err(NtError::Protocol(format!("Server error: {}", message)));
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to decode handshake message: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(NtError::Transport(format!(
                            "Table server ({}) closed connection during handshake",
                            url
                        )));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    _ => {}
                }
            }
            _ = tokio::time::sleep(remaining) => {
                return Err(NtError::Transport(format!(
                    "Timeout waiting for table server response ({})",
                    url
                )));
            }
        }
    }
}
