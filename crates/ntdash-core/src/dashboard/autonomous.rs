//! Autonomous mode selection
//!
//! The robot posts its routines as a JSON object (`id -> description`) at
//! `SmartDashboard/autonomous/auto_modes`. The operator orders them; the
//! top three ids go back as a JSON array string in `selected_modes`, and
//! the starting position as `"l"`, `"c"` or `"r"` in `selected_position`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::NtResult;
use crate::path;
use crate::sync::SyncClient;

pub const AUTONOMOUS_TABLE: &str = "SmartDashboard/autonomous";
pub const AUTO_MODES_KEY: &str = "auto_modes";
pub const SELECTED_MODES_KEY: &str = "selected_modes";
pub const SELECTED_POSITION_KEY: &str = "selected_position";

/// How many modes are sent back to the robot
pub const SELECTED_MODE_COUNT: usize = 3;

/// An autonomous routine offered by the robot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoMode {
    pub id: String,
    pub description: String,
}

/// Robot starting position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    Left,
    Centre,
    Right,
}

impl StartPosition {
    /// Code written to `selected_position`
    pub fn code(&self) -> &'static str {
        match self {
            StartPosition::Left => "l",
            StartPosition::Centre => "c",
            StartPosition::Right => "r",
        }
    }
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for StartPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "left" => Ok(StartPosition::Left),
            "c" | "centre" | "center" => Ok(StartPosition::Centre),
            "r" | "right" => Ok(StartPosition::Right),
            other => Err(format!("unknown start position '{}'", other)),
        }
    }
}

/// `auto_modes` payload, in document order
struct PostedModes(Vec<AutoMode>);

impl<'de> Deserialize<'de> for PostedModes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ModesVisitor;

        impl<'de> Visitor<'de> for ModesVisitor {
            type Value = PostedModes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of mode id to description")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PostedModes, A::Error> {
                let mut modes = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, description)) = map.next_entry::<String, String>()? {
                    modes.push(AutoMode { id, description });
                }
                Ok(PostedModes(modes))
            }
        }

        deserializer.deserialize_map(ModesVisitor)
    }
}

/// Parse an `auto_modes` payload; `None` if it is not a string-to-string object
pub fn parse_auto_modes(json: &str) -> Option<Vec<AutoMode>> {
    match serde_json::from_str::<PostedModes>(json) {
        Ok(PostedModes(modes)) => Some(modes),
        Err(e) => {
            warn!("Ignoring malformed auto_modes payload: {}", e);
            None
        }
    }
}

/// Keeps the operator's mode order in sync with the robot
#[derive(Clone)]
pub struct AutonomousSelector {
    client: SyncClient,
    modes: Arc<Mutex<Vec<AutoMode>>>,
}

impl AutonomousSelector {
    pub fn new(client: SyncClient) -> NtResult<Self> {
        let selector = Self {
            client: client.clone(),
            modes: Arc::new(Mutex::new(Vec::new())),
        };

        let handle = selector.clone();
        client.add_string_listener(&path::join(AUTONOMOUS_TABLE, AUTO_MODES_KEY), move |json| {
            handle.on_auto_modes(&json)
        })?;
        Ok(selector)
    }

    fn on_auto_modes(&self, json: &str) {
        let Some(modes) = parse_auto_modes(json) else {
            return;
        };
        debug!("Robot posted {} autonomous modes", modes.len());
        *self.lock() = modes;
        self.send_selected_modes();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AutoMode>> {
        self.modes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Modes in operator order
    pub fn modes(&self) -> Vec<AutoMode> {
        self.lock().clone()
    }

    /// Ids that are (or would be) sent to the robot
    pub fn selected_ids(&self) -> Vec<String> {
        self.lock()
            .iter()
            .take(SELECTED_MODE_COUNT)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Move the mode at `from` to `to` and resend the selection
    pub fn move_mode(&self, from: usize, to: usize) -> bool {
        {
            let mut modes = self.lock();
            if from >= modes.len() || to >= modes.len() {
                return false;
            }
            let mode = modes.remove(from);
            modes.insert(to, mode);
        }
        self.send_selected_modes();
        true
    }

    /// Write the top ids to `selected_modes` as a JSON array string
    pub fn send_selected_modes(&self) -> bool {
        let ids = self.selected_ids();
        match serde_json::to_string(&ids) {
            Ok(json) => self
                .client
                .set_string(&path::join(AUTONOMOUS_TABLE, SELECTED_MODES_KEY), &json),
            Err(e) => {
                warn!("Failed to encode selected modes: {}", e);
                false
            }
        }
    }

    pub fn select_position(&self, position: StartPosition) -> bool {
        self.client.set_string(
            &path::join(AUTONOMOUS_TABLE, SELECTED_POSITION_KEY),
            position.code(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Dispatcher, SyncOptions};
    use crate::transport::MemoryServer;
    use crate::value::Value;

    const MODES_PATH: &str = "SmartDashboard/autonomous/auto_modes";
    const SELECTED_PATH: &str = "SmartDashboard/autonomous/selected_modes";

    async fn connected(server: &MemoryServer) -> (SyncClient, Dispatcher, AutonomousSelector) {
        let client = SyncClient::new(Arc::new(server.connector()), SyncOptions::default());
        let dispatcher = client.take_dispatcher().unwrap();
        let selector = AutonomousSelector::new(client.clone()).unwrap();
        assert!(client.connect(server.address()).await);
        (client, dispatcher, selector)
    }

    #[test]
    fn test_parse_keeps_document_order() {
        let modes = parse_auto_modes(r#"{"z": "Zig", "a": "Straight", "m": "Scale"}"#).unwrap();
        let ids: Vec<&str> = modes.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
        assert_eq!(modes[1].description, "Straight");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_auto_modes("").is_none());
        assert!(parse_auto_modes("[\"a\"]").is_none());
        assert!(parse_auto_modes(r#"{"a": 1}"#).is_none());
        assert_eq!(parse_auto_modes("{}"), Some(Vec::new()));
    }

    #[test]
    fn test_start_position_codes() {
        assert_eq!(StartPosition::Centre.code(), "c");
        assert_eq!("Right".parse::<StartPosition>().unwrap(), StartPosition::Right);
        assert_eq!("center".parse::<StartPosition>().unwrap(), StartPosition::Centre);
        assert!("middle".parse::<StartPosition>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_posted_modes_are_echoed_as_selection() {
        let server = MemoryServer::new("10.0.0.2");
        server.put(MODES_PATH, r#"{"s": "Switch", "c": "Cross", "x": "Scale", "n": "Nothing"}"#);
        let (_client, mut dispatcher, selector) = connected(&server).await;

        dispatcher.dispatch_pending();
        assert_eq!(selector.modes().len(), 4);
        assert_eq!(server.get(SELECTED_PATH), Value::from(r#"["s","c","x"]"#));

        assert!(selector.move_mode(3, 0));
        assert_eq!(selector.selected_ids(), vec!["n", "s", "c"]);
        assert_eq!(server.get(SELECTED_PATH), Value::from(r#"["n","s","c"]"#));
        assert!(!selector.move_mode(0, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_update_keeps_previous_modes() {
        let server = MemoryServer::new("10.0.0.2");
        server.put(MODES_PATH, r#"{"a": "Auto A"}"#);
        let (_client, mut dispatcher, selector) = connected(&server).await;
        dispatcher.dispatch_pending();

        server.put(MODES_PATH, "{not json");
        dispatcher.dispatch_pending();

        assert_eq!(
            selector.modes(),
            vec![AutoMode {
                id: "a".to_string(),
                description: "Auto A".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_position() {
        let server = MemoryServer::new("10.0.0.2");
        let (client, _dispatcher, selector) = connected(&server).await;

        assert!(selector.select_position(StartPosition::Left));
        assert_eq!(
            server.get("SmartDashboard/autonomous/selected_position"),
            Value::from("l")
        );

        client.disconnect();
        assert!(!selector.select_position(StartPosition::Right));
    }
}
