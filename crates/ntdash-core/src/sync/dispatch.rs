//! Dispatcher
//!
//! Transport threads only enqueue; the dispatcher is the single context
//! that runs consumer callbacks. Events carry the connection epoch they
//! came from, and anything from an epoch other than the current one is
//! discarded.

use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::client::{lock, Shared};
use crate::value::Value;

/// Queued notification
#[derive(Debug, Clone)]
pub(crate) enum Dispatch {
    /// A table value changed (or is being replayed)
    Change { epoch: u64, path: String, value: Value },
    /// The transport reported a connection change
    Transport { epoch: u64, connected: bool },
    /// A connection transition the client already decided to announce
    Connection(bool),
}

/// Runs consumer callbacks for a [`SyncClient`](super::SyncClient)
///
/// Obtained once via `SyncClient::take_dispatcher`. Either drain it from
/// your own loop with [`dispatch_pending`](Self::dispatch_pending) or hand
/// it to a task with [`run`](Self::run).
pub struct Dispatcher {
    shared: Weak<Shared>,
    events: mpsc::UnboundedReceiver<Dispatch>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Weak<Shared>, events: mpsc::UnboundedReceiver<Dispatch>) -> Self {
        Self { shared, events }
    }

    /// Handle everything queued so far without waiting
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut invoked = 0;
        while let Ok(event) = self.events.try_recv() {
            invoked += self.handle(event);
        }
        invoked
    }

    /// Wait for the next event and handle it
    ///
    /// Returns false once the client is gone.
    pub async fn next(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Dispatch until the client is dropped
    pub async fn run(mut self) {
        while self.next().await {
            if self.shared.strong_count() == 0 {
                break;
            }
        }
        debug!("Dispatcher stopped");
    }

    fn handle(&self, event: Dispatch) -> usize {
        let Some(shared) = self.shared.upgrade() else {
            return 0;
        };

        match event {
            Dispatch::Change { epoch, path, value } => {
                if epoch != shared.current_epoch() {
                    trace!("Dropping stale update for {}", path);
                    return 0;
                }
                let Some(listener) = lock(&shared.listeners).get(&path) else {
                    return 0;
                };
                if listener.call(&value) {
                    1
                } else {
                    // Typed listeners never see Unassigned; that is not a mismatch
                    if value.is_assigned() {
                        debug!(
                            "Dropping {} value for {}: listener expects {:?}",
                            value.kind(),
                            path,
                            listener.expected_kind()
                        );
                    }
                    0
                }
            }
            Dispatch::Transport { epoch, connected } => {
                if connected {
                    trace!("Transport connected (epoch {})", epoch);
                    return 0;
                }
                if shared.handle_transport_lost(epoch) {
                    shared.notify_connection(false)
                } else {
                    0
                }
            }
            Dispatch::Connection(connected) => shared.notify_connection(connected),
        }
    }
}
