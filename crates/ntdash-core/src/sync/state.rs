//! Connection state
//!
//! `Disconnected -> Connecting -> Connected`, and back to `Disconnected`
//! on timeout, explicit disconnect or transport failure. There is no
//! direct `Disconnected -> Connected` edge.

use std::fmt;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected, not trying
    #[default]
    Disconnected,
    /// Waiting for the server to acknowledge us
    Connecting,
    /// Connected and mirroring
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Text for a status indicator
    pub fn status_message(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Disconnected => "OFFLINE",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_message())
    }
}

/// Tracks the last announced connected flag so only transitions go out
#[derive(Debug, Default)]
pub(crate) struct Announcer {
    last: bool,
}

impl Announcer {
    /// Record `connected`; true if it differs from the last announcement
    pub fn transition(&mut self, connected: bool) -> bool {
        if self.last == connected {
            return false;
        }
        self.last = connected;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message() {
        assert_eq!(ConnectionState::Connected.status_message(), "CONNECTED");
        assert_eq!(ConnectionState::Connecting.status_message(), "CONNECTING");
        assert_eq!(ConnectionState::default().to_string(), "OFFLINE");
        assert!(!ConnectionState::Connecting.is_connected());
    }

    #[test]
    fn test_announcer_suppresses_repeats() {
        let mut announcer = Announcer::default();

        // Starts disconnected: a failed attempt has nothing to announce
        assert!(!announcer.transition(false));
        assert!(announcer.transition(true));
        assert!(!announcer.transition(true));
        assert!(announcer.transition(false));
        assert!(!announcer.transition(false));
    }
}
