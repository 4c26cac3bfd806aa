//! Table protocol transports
//!
//! - `memory`: in-process server, no network
//! - `ws`: WebSocket client and server

mod mirror;

pub mod memory;
pub mod ws;

pub use memory::{MemoryConnector, MemoryServer};
pub use ws::{ServerHandle, WsConnector, WsTableServer};
