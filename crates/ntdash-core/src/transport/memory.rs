//! In-process table server
//!
//! A complete [`Connector`] implementation that never touches the network.
//! The server acknowledges new clients after a configurable delay, pushes
//! remote changes to every connected client and can simulate a dropped
//! transport. Useful for tests and offline demos.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tracing::debug;

use super::mirror::{Mirror, MirrorTable, Upstream};
use crate::protocol::{
    ClientOptions, ConnectionListener, ConnectionNotice, Connector, Table, TableClient,
};
use crate::path;
use crate::value::Value;

/// Default delay before a new client is acknowledged
const DEFAULT_ACK_DELAY: Duration = Duration::from_millis(100);

/// Authoritative in-memory table server
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    address: String,
    state: Mutex<ServerState>,
}

struct ServerState {
    entries: BTreeMap<String, Value>,
    online: bool,
    ack_delay: Duration,
    clients: Vec<Arc<ClientShared>>,
}

impl MemoryServer {
    /// Create an online server reachable at `address`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                address: address.into(),
                state: Mutex::new(ServerState {
                    entries: BTreeMap::new(),
                    online: true,
                    ack_delay: DEFAULT_ACK_DELAY,
                    clients: Vec::new(),
                }),
            }),
        }
    }

    /// Set how long new clients wait for an acknowledgement
    pub fn with_ack_delay(self, delay: Duration) -> Self {
        self.inner.lock().ack_delay = delay;
        self
    }

    /// Address clients must use to reach this server
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// An offline server never acknowledges new clients
    pub fn set_online(&self, online: bool) {
        self.inner.lock().online = online;
    }

    /// Connector that opens clients against this server
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            server: self.inner.clone(),
        }
    }

    /// Write a value as the robot would
    pub fn put(&self, path: &str, value: impl Into<Value>) {
        self.inner.put(path, value.into());
    }

    /// Remove a value as the robot would
    pub fn delete(&self, path: &str) {
        self.inner.delete(path);
    }

    /// Current authoritative value
    pub fn get(&self, path: &str) -> Value {
        self.inner
            .lock()
            .entries
            .get(path::normalize_table(path))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of acknowledged clients
    pub fn client_count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    /// Simulate a transport failure: every client loses its connection
    pub fn drop_clients(&self) {
        let clients = std::mem::take(&mut self.inner.lock().clients);
        for client in clients {
            if client.connected.swap(false, Ordering::SeqCst) {
                debug!("Dropping memory client {}", client.id);
                (client.on_connection)(ConnectionNotice {
                    remote: Some(self.inner.address.clone()),
                    connected: false,
                });
            }
        }
    }
}

impl ServerInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, path: &str, value: Value) {
        let path = path::normalize_table(path);
        let clients = {
            let mut state = self.lock();
            state.entries.insert(path.to_string(), value.clone());
            state.clients.clone()
        };
        for client in clients {
            client.mirror.apply(path, value.clone(), false);
        }
    }

    fn delete(&self, path: &str) {
        let path = path::normalize_table(path);
        let clients = {
            let mut state = self.lock();
            state.entries.remove(path);
            state.clients.clone()
        };
        for client in clients {
            client.mirror.remove(path, false);
        }
    }

    /// Acknowledge a client after its handshake delay
    fn accept(&self, client: Arc<ClientShared>) {
        if client.closed.load(Ordering::SeqCst) {
            return;
        }

        let snapshot = {
            let mut state = self.lock();
            if !state.online || client.address != self.address {
                debug!(
                    "Memory server {} ignoring client {} (online={}, requested {})",
                    self.address, client.id, state.online, client.address
                );
                return;
            }
            state.clients.push(client.clone());
            state.entries.clone()
        };

        client.mirror.replace_all(snapshot);
        client.connected.store(true, Ordering::SeqCst);
        (client.on_connection)(ConnectionNotice {
            remote: Some(self.address.clone()),
            connected: true,
        });
    }

    fn detach(&self, client_id: &str) {
        self.lock().clients.retain(|c| c.id != client_id);
    }
}

/// Opens [`MemoryClient`]s against a [`MemoryServer`]
#[derive(Clone)]
pub struct MemoryConnector {
    server: Arc<ServerInner>,
}

impl Connector for MemoryConnector {
    fn open(
        &self,
        options: &ClientOptions,
        on_connection: ConnectionListener,
    ) -> Arc<dyn TableClient> {
        let shared = Arc::new(ClientShared {
            id: options.client_id.clone(),
            address: options.address.clone(),
            mirror: Arc::new(Mirror::new()),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            on_connection,
            server: Arc::downgrade(&self.server),
        });

        let server = self.server.clone();
        let pending = shared.clone();
        tokio::spawn(async move {
            let delay = server.lock().ack_delay;
            tokio::time::sleep(delay).await;
            server.accept(pending);
        });

        Arc::new(MemoryClient { shared })
    }
}

struct ClientShared {
    id: String,
    address: String,
    mirror: Arc<Mirror>,
    connected: AtomicBool,
    closed: AtomicBool,
    on_connection: ConnectionListener,
    server: Weak<ServerInner>,
}

impl Upstream for ClientShared {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn send_put(&self, path: &str, value: Value) -> bool {
        match self.server.upgrade() {
            Some(server) => {
                server.put(path, value);
                true
            }
            None => false,
        }
    }

    fn send_delete(&self, path: &str) -> bool {
        match self.server.upgrade() {
            Some(server) => {
                server.delete(path);
                true
            }
            None => false,
        }
    }
}

/// Client handle opened by [`MemoryConnector`]
pub struct MemoryClient {
    shared: Arc<ClientShared>,
}

impl TableClient for MemoryClient {
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
        if let Some(server) = self.shared.server.upgrade() {
            server.detach(&self.shared.id);
        }
    }
}
