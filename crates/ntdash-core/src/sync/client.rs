//! Sync client implementation
//!
//! Owns the connection lifecycle, the listener registry and the table
//! cache. Transport callbacks never reach consumer code directly: they are
//! queued with the epoch of the connection that produced them and run by
//! the [`Dispatcher`].

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::TableCache;
use super::dispatch::{Dispatch, Dispatcher};
use super::listener::{Callback, Listener, ListenerRegistry};
use super::state::{Announcer, ConnectionState};
use crate::error::NtResult;
use crate::path;
use crate::protocol::{
    ChangeFlags, ClientOptions, ConnectionListener, ConnectionNotice, Connector, Table,
    TableClient, TableListener,
};
use crate::value::Value;

/// Default table server port
pub const DEFAULT_PORT: u16 = 1735;

/// How long a connection attempt may take
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often a pending attempt checks the transport
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sync client options
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    /// Identifier announced to the server
    pub client_id: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            client_id: format!("ntdash-{}", &uuid::Uuid::new_v4().to_string()[..8]),
        }
    }
}

impl SyncOptions {
    /// Pause before the next check, never running past the deadline
    fn poll_wait(&self, remaining: Duration) -> Duration {
        self.poll_interval.max(Duration::from_millis(1)).min(remaining)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Session {
    state: ConnectionState,
    /// Bumped whenever a connection attempt starts or is torn down
    epoch: u64,
    address: Option<String>,
    client: Option<Arc<dyn TableClient>>,
    cache: TableCache,
    announcer: Announcer,
}

/// State shared between client handles and the dispatcher
///
/// Lock order: `session` before `listeners`. Transport callbacks only
/// ever take `listeners`.
pub(crate) struct Shared {
    connector: Arc<dyn Connector>,
    options: SyncOptions,
    session: Mutex<Session>,
    pub(crate) listeners: Arc<Mutex<ListenerRegistry>>,
    connection_callbacks: Mutex<Vec<Callback<bool>>>,
    status_tx: watch::Sender<ConnectionState>,
    status_rx: watch::Receiver<ConnectionState>,
    events_tx: mpsc::UnboundedSender<Dispatch>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.session().epoch
    }

    fn set_state(&self, session: &mut Session, state: ConnectionState) {
        session.state = state;
        self.status_tx.send_replace(state);
    }

    fn emit(&self, event: Dispatch) {
        if self.events_tx.send(event).is_err() {
            debug!("Dispatcher gone, dropping event");
        }
    }

    fn connection_listener(&self, epoch: u64) -> ConnectionListener {
        let events = self.events_tx.clone();
        Arc::new(move |notice: ConnectionNotice| {
            debug!(
                "Transport reports connected={} (remote {:?})",
                notice.connected, notice.remote
            );
            let _ = events.send(Dispatch::Transport {
                epoch,
                connected: notice.connected,
            });
        })
    }

    fn table_listener(&self, epoch: u64) -> TableListener {
        let events = self.events_tx.clone();
        let listeners = self.listeners.clone();
        Arc::new(
            move |table: &str, key: &str, value: &Value, _flags: ChangeFlags| {
                let path = path::join(table, key);
                if !lock(&listeners).contains(&path) {
                    return;
                }
                let _ = events.send(Dispatch::Change {
                    epoch,
                    path,
                    value: value.clone(),
                });
            },
        )
    }

    /// Cached table for a connected session, subscribing on first use
    fn resolve_table(&self, session: &mut Session, table_path: &str) -> Option<Arc<dyn Table>> {
        if !session.state.is_connected() {
            return None;
        }
        let client = session.client.clone()?;
        let epoch = session.epoch;
        let (table, created) = session.cache.resolve(table_path, client.as_ref())?;
        if created {
            table.add_listener(self.table_listener(epoch));
            debug!("Subscribed to table {}", table.path());
        }
        Some(table)
    }

    /// Resolve every table a listener or an earlier lookup asked for
    fn populate(&self, session: &mut Session) {
        let mut tables = lock(&self.listeners).tables();
        tables.extend(session.cache.pending());
        for table in tables {
            self.resolve_table(session, &table);
        }
    }

    /// Queue the current value of every registered path
    fn replay(&self, session: &Session) {
        let paths = lock(&self.listeners).paths();
        debug!("Replaying {} registered paths", paths.len());
        for registered in paths {
            let Ok((table, key)) = path::split_path(&registered) else {
                continue;
            };
            let value = session
                .cache
                .get(table)
                .map(|t| t.get_value(key))
                .unwrap_or_default();
            self.emit(Dispatch::Change {
                epoch: session.epoch,
                path: registered,
                value,
            });
        }
    }

    fn teardown(&self, session: &mut Session) {
        session.epoch += 1;
        if let Some(client) = session.client.take() {
            client.shutdown();
        }
        session.cache.clear();
        session.address = None;
        self.set_state(session, ConnectionState::Disconnected);
    }

    /// React to the transport dropping; true if the drop should be announced
    pub(crate) fn handle_transport_lost(&self, epoch: u64) -> bool {
        let mut session = self.session();
        if session.epoch != epoch || !session.state.is_connected() {
            return false;
        }
        warn!(
            "Lost connection to {}",
            session.address.as_deref().unwrap_or("table server")
        );
        self.teardown(&mut session);
        session.announcer.transition(false)
    }

    /// Run connection callbacks; returns how many ran
    pub(crate) fn notify_connection(&self, connected: bool) -> usize {
        let callbacks: Vec<Callback<bool>> = lock(&self.connection_callbacks).clone();
        for callback in &callbacks {
            callback(connected);
        }
        callbacks.len()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = session.client.take() {
            client.shutdown();
        }
    }
}

/// Synchronization client
///
/// Cheap to clone; every clone drives the same connection.
#[derive(Clone)]
pub struct SyncClient {
    shared: Arc<Shared>,
}

impl SyncClient {
    /// Create a disconnected client
    pub fn new(connector: Arc<dyn Connector>, options: SyncOptions) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                connector,
                options,
                session: Mutex::new(Session::default()),
                listeners: Arc::new(Mutex::new(ListenerRegistry::new())),
                connection_callbacks: Mutex::new(Vec::new()),
                status_tx,
                status_rx,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.shared.options
    }

    /// Take the dispatcher (can only be called once)
    pub fn take_dispatcher(&self) -> Option<Dispatcher> {
        let events = lock(&self.shared.events_rx).take()?;
        Some(Dispatcher::new(Arc::downgrade(&self.shared), events))
    }

    /// Get the current status
    pub fn status(&self) -> ConnectionState {
        *self.shared.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.shared.status_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// `CONNECTED`, `CONNECTING` or `OFFLINE`
    pub fn status_message(&self) -> &'static str {
        self.status().status_message()
    }

    /// Address of the current or pending connection
    pub fn address(&self) -> Option<String> {
        self.shared.session().address.clone()
    }

    /// Subscribe to connection transitions
    ///
    /// Callbacks run on the dispatcher and only see real transitions.
    pub fn on_connection(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        lock(&self.shared.connection_callbacks).push(Arc::new(callback));
    }

    /// Connect to `address` (hostname or literal IP)
    ///
    /// Waits up to the connect timeout for the server to acknowledge us.
    /// Returns whether the attempt succeeded; failures are not errors.
    /// Callers should not start a second attempt while one is pending.
    pub async fn connect(&self, address: &str) -> bool {
        let shared = &self.shared;
        let epoch = {
            let mut session = shared.session();
            match session.state {
                ConnectionState::Connecting => {
                    warn!("Connection attempt already in progress, ignoring {}", address);
                    return false;
                }
                ConnectionState::Connected => {
                    debug!("Already connected");
                    return true;
                }
                ConnectionState::Disconnected => {}
            }
            session.epoch += 1;
            session.address = Some(address.to_string());
            shared.set_state(&mut session, ConnectionState::Connecting);
            session.epoch
        };

        info!("Connecting to {}:{}", address, shared.options.port);
        let resolved = resolve_address(address, shared.options.port).await;

        let client = {
            let mut session = shared.session();
            if session.epoch != epoch {
                debug!("Connection attempt to {} cancelled", address);
                return false;
            }
            let options = ClientOptions {
                address: resolved,
                port: shared.options.port,
                client_id: shared.options.client_id.clone(),
            };
            let client = shared
                .connector
                .open(&options, shared.connection_listener(epoch));
            session.client = Some(client.clone());
            client
        };

        let deadline = Instant::now() + shared.options.connect_timeout;
        let acknowledged = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(shared.options.poll_wait(remaining)).await;
            if shared.current_epoch() != epoch {
                debug!("Connection attempt to {} cancelled", address);
                return false;
            }
            if client.is_connected() {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
        };

        let mut session = shared.session();
        if session.epoch != epoch {
            return false;
        }
        if !acknowledged {
            warn!(
                "Could not connect to {} within {:?}",
                address, shared.options.connect_timeout
            );
            shared.teardown(&mut session);
            return false;
        }

        shared.set_state(&mut session, ConnectionState::Connected);
        info!("Connected to {}", address);

        shared.populate(&mut session);
        if session.announcer.transition(true) {
            shared.emit(Dispatch::Connection(true));
        }
        shared.replay(&session);
        true
    }

    /// Run [`connect`](Self::connect) in the background
    pub fn spawn_connect(&self, address: impl Into<String>) -> JoinHandle<bool> {
        let client = self.clone();
        let address = address.into();
        tokio::spawn(async move { client.connect(&address).await })
    }

    /// Tear down the connection
    ///
    /// Cancels a pending attempt. Only a drop from Connected is announced.
    pub fn disconnect(&self) {
        let shared = &self.shared;
        let mut session = shared.session();
        let previous = session.state;
        if previous == ConnectionState::Disconnected {
            debug!("Already disconnected");
            return;
        }

        shared.teardown(&mut session);
        info!("Disconnected");

        if previous.is_connected() && session.announcer.transition(false) {
            shared.emit(Dispatch::Connection(false));
        }
    }

    /// Register a callback for `path`
    ///
    /// The first registration for a path wins; later ones return `Ok(false)`.
    /// When connected, the owning table is subscribed right away, otherwise
    /// on the next successful connect.
    pub fn add_key_listener(&self, path: &str, listener: Listener) -> NtResult<bool> {
        let (table, key) = path::split_path(path)?;
        let canonical = path::join(table, key);

        if !lock(&self.shared.listeners).register(&canonical, listener) {
            debug!("Listener for {} already registered", canonical);
            return Ok(false);
        }

        let mut session = self.shared.session();
        if self.shared.resolve_table(&mut session, table).is_none() {
            session.cache.reserve(table);
        }
        Ok(true)
    }

    pub fn add_bool_listener(
        &self,
        path: &str,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::bool(callback))
    }

    pub fn add_double_listener(
        &self,
        path: &str,
        callback: impl Fn(f64) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::double(callback))
    }

    pub fn add_string_listener(
        &self,
        path: &str,
        callback: impl Fn(String) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::string(callback))
    }

    pub fn add_raw_listener(
        &self,
        path: &str,
        callback: impl Fn(Vec<u8>) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::raw(callback))
    }

    pub fn add_double_array_listener(
        &self,
        path: &str,
        callback: impl Fn(Vec<f64>) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::double_array(callback))
    }

    pub fn add_string_array_listener(
        &self,
        path: &str,
        callback: impl Fn(Vec<String>) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::string_array(callback))
    }

    /// Listen for any value, including `Unassigned` on replay
    pub fn add_value_listener(
        &self,
        path: &str,
        callback: impl Fn(Value) + Send + Sync + 'static,
    ) -> NtResult<bool> {
        self.add_key_listener(path, Listener::value(callback))
    }

    fn table(&self, table_path: &str) -> Option<Arc<dyn Table>> {
        let mut session = self.shared.session();
        self.shared.resolve_table(&mut session, table_path)
    }

    /// Current mirrored value at `path`
    ///
    /// `Unassigned` when disconnected or absent. Fails only for a malformed
    /// path.
    pub fn get_value(&self, path: &str) -> NtResult<Value> {
        let (table, key) = path::split_path(path)?;
        Ok(self
            .table(table)
            .map(|t| t.get_value(key))
            .unwrap_or_default())
    }

    fn lookup(&self, path: &str) -> Value {
        self.get_value(path).unwrap_or_else(|e| {
            warn!("{}", e);
            Value::Unassigned
        })
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.lookup(path).as_bool().unwrap_or_default()
    }

    pub fn get_double(&self, path: &str) -> f64 {
        self.lookup(path).as_double().unwrap_or_default()
    }

    pub fn get_string(&self, path: &str) -> String {
        self.lookup(path).as_str().unwrap_or_default().to_string()
    }

    pub fn get_byte_array(&self, path: &str) -> Option<Vec<u8>> {
        self.lookup(path).as_raw().map(<[u8]>::to_vec)
    }

    pub fn get_double_array(&self, path: &str) -> Option<Vec<f64>> {
        self.lookup(path).as_double_array().map(<[f64]>::to_vec)
    }

    pub fn get_string_array(&self, path: &str) -> Option<Vec<String>> {
        self.lookup(path).as_string_array().map(<[String]>::to_vec)
    }

    /// Write through to the server
    ///
    /// Returns `Ok(false)` when disconnected; the write is dropped, not queued.
    pub fn set_value(&self, path: &str, value: impl Into<Value>) -> NtResult<bool> {
        let (table, key) = path::split_path(path)?;
        match self.table(table) {
            Some(table) => Ok(table.put_value(key, value.into())),
            None => {
                debug!("Not connected, dropping write to {}", path);
                Ok(false)
            }
        }
    }

    fn write(&self, path: &str, value: Value) -> bool {
        self.set_value(path, value).unwrap_or_else(|e| {
            warn!("{}", e);
            false
        })
    }

    pub fn set_bool(&self, path: &str, value: bool) -> bool {
        self.write(path, Value::Bool(value))
    }

    pub fn set_double(&self, path: &str, value: f64) -> bool {
        self.write(path, Value::Double(value))
    }

    pub fn set_string(&self, path: &str, value: &str) -> bool {
        self.write(path, Value::from(value))
    }

    pub fn set_byte_array(&self, path: &str, value: Vec<u8>) -> bool {
        self.write(path, Value::Raw(value))
    }

    pub fn set_double_array(&self, path: &str, value: Vec<f64>) -> bool {
        self.write(path, Value::DoubleArray(value))
    }

    pub fn set_string_array(&self, path: &str, value: Vec<String>) -> bool {
        self.write(path, Value::StringArray(value))
    }

    /// Every immediate key of a table with its value
    ///
    /// `None` when disconnected.
    pub fn get_all_values_in_table(&self, table_path: &str) -> Option<BTreeMap<String, Value>> {
        let table = self.table(table_path)?;
        Some(
            table
                .keys()
                .into_iter()
                .map(|key| {
                    let value = table.get_value(&key);
                    (key, value)
                })
                .collect(),
        )
    }

    /// Names of the immediate sub-tables of a table (empty when disconnected)
    pub fn get_sub_tables(&self, table_path: &str) -> Vec<String> {
        self.table(table_path)
            .map(|t| t.sub_tables().into_iter().collect())
            .unwrap_or_default()
    }
}

/// Resolve a hostname, preferring IPv4; unresolvable names pass through
async fn resolve_address(address: &str, port: u16) -> String {
    if address.parse::<IpAddr>().is_ok() {
        return address.to_string();
    }

    match tokio::net::lookup_host((address, port)).await {
        Ok(addrs) => match prefer_ipv4(addrs) {
            Some(ip) => {
                debug!("Resolved {} to {}", address, ip);
                ip.to_string()
            }
            None => {
                warn!("No addresses found for {}", address);
                address.to_string()
            }
        },
        Err(e) => {
            warn!("Could not resolve {}: {}", address, e);
            address.to_string()
        }
    }
}

fn prefer_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<IpAddr> {
    let addrs: Vec<SocketAddr> = addrs.into_iter().collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
}
