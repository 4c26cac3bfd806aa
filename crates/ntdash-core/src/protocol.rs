//! Table protocol client interface
//!
//! The sync client never talks to a socket directly. It drives a
//! [`Connector`], which opens a fresh [`TableClient`] for every connection
//! attempt; the client hands out [`Table`] handles that mirror the remote
//! tables and report changes through listeners.
//!
//! Listeners registered here are called on the transport's own thread.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::value::Value;

/// How to reach the table server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Resolved server address (literal IP or hostname)
    pub address: String,
    /// Server port
    pub port: u16,
    /// Identifier this client announces to the server
    pub client_id: String,
}

/// Connection state change reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionNotice {
    /// Identifier of the remote end, when known
    pub remote: Option<String>,
    /// Whether the transport is now connected
    pub connected: bool,
}

/// Describes a single table change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    /// The key did not exist before
    pub is_new: bool,
    /// The change was made by this client
    pub is_local: bool,
    /// The key was removed (value is `Unassigned`)
    pub is_delete: bool,
}

/// Called with every connect/disconnect the transport observes
pub type ConnectionListener = Arc<dyn Fn(ConnectionNotice) + Send + Sync>;

/// Called with `(table path, key, value, flags)` for immediate keys of a table
pub type TableListener = Arc<dyn Fn(&str, &str, &Value, ChangeFlags) + Send + Sync>;

/// Opens client handles (configure + initialize)
pub trait Connector: Send + Sync {
    /// Start a new client against `options`; connection happens in the background
    fn open(&self, options: &ClientOptions, on_connection: ConnectionListener)
        -> Arc<dyn TableClient>;
}

/// A single connection's view of the remote tables
pub trait TableClient: Send + Sync {
    /// Whether the server has acknowledged this client
    fn is_connected(&self) -> bool;

    /// Handle to a top-level table
    fn table(&self, name: &str) -> Arc<dyn Table>;

    /// Tear the client down; no listener fires afterwards
    fn shutdown(&self);
}

/// A remote-backed table
pub trait Table: Send + Sync {
    /// Full path of this table
    fn path(&self) -> &str;

    /// Handle to an immediate sub-table
    fn sub_table(&self, name: &str) -> Arc<dyn Table>;

    /// Current value of an immediate key (`Unassigned` if absent)
    fn get_value(&self, key: &str) -> Value;

    /// Write a value; false when the write could not be issued
    fn put_value(&self, key: &str, value: Value) -> bool;

    /// Names of immediate keys holding values
    fn keys(&self) -> BTreeSet<String>;

    /// Names of immediate sub-tables
    fn sub_tables(&self) -> BTreeSet<String>;

    /// Listen for changes to immediate keys of this table
    fn add_listener(&self, listener: TableListener);
}
