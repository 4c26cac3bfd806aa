//! Synchronization client
//!
//! Keeps a typed, de-duplicated view of the remote tables for many
//! independent consumers.
//!
//! ## Lifecycle
//!
//! 1. Create a [`SyncClient`] with a [`Connector`](crate::protocol::Connector)
//! 2. Take the [`Dispatcher`] and run it on the context that owns the UI
//! 3. Register listeners, then `connect`
//! 4. On every successful connect, each registered path is replayed once
//!    with its current value
//!
//! ## Usage
//!
//! ```ignore
//! let client = SyncClient::new(Arc::new(WsConnector::new()), SyncOptions::default());
//! let dispatcher = client.take_dispatcher().unwrap();
//! tokio::spawn(dispatcher.run());
//!
//! client.add_double_listener("SmartDashboard/Lift Distance", |height| {
//!     println!("lift at {height}");
//! })?;
//! client.connect("10.0.0.2").await;
//! ```

mod cache;
mod client;
mod dispatch;
mod listener;
mod state;

pub use cache::TableCache;
pub use client::{
    SyncClient, SyncOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_PORT,
};
pub use dispatch::Dispatcher;
pub use listener::{Callback, Listener, ListenerRegistry};
pub use state::ConnectionState;
