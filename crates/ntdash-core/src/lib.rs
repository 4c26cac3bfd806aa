//! ntdash core library
//!
//! This crate provides the core of ntdash, a robot dashboard client that
//! keeps a typed mirror of a remote key/value table server.
//!
//! # Architecture
//!
//! - **Transports** implement the table protocol traits in `protocol`
//! - **SyncClient** drives one transport connection at a time, owns the
//!   listener registry and table cache, and replays values on connect
//! - **Dispatcher** runs every consumer callback on one context
//!
//! # Quick Start
//!
//! ```text
//! let client = SyncClient::new(Arc::new(WsConnector::new()), config.client_options());
//! let mut dispatcher = client.take_dispatcher().unwrap();
//!
//! client.add_double_listener("SmartDashboard/Lift Distance", |h| println!("{h}"))?;
//! client.connect(&config.server_address).await;
//! dispatcher.dispatch_pending();
//! ```
//!
//! # Modules
//!
//! - `sync`: Synchronization client (main entry point)
//! - `value`: Typed table values
//! - `path`: `table/key` path helpers
//! - `protocol`: Table protocol client traits
//! - `transport`: In-memory and WebSocket transports
//! - `dashboard`: Panel logic built on the client
//! - `config`: Application configuration

pub mod config;
pub mod dashboard;
pub mod error;
pub mod path;
pub mod protocol;
pub mod sync;
pub mod transport;
pub mod value;

pub use config::Config;
pub use dashboard::{Dashboard, DashboardSnapshot};
pub use error::{NtError, NtResult};
pub use protocol::{ChangeFlags, ClientOptions, Connector, Table, TableClient};
pub use sync::{ConnectionState, Dispatcher, Listener, SyncClient, SyncOptions};
pub use transport::{MemoryServer, ServerHandle, WsConnector, WsTableServer};
pub use value::{Value, ValueKind};
