//! Table protocol message types
//!
//! Messages exchanged with a table server over WebSocket using CBOR encoding.

use serde::{Deserialize, Serialize};

use crate::error::{NtError, NtResult};
use crate::value::Value;

/// Protocol version
pub const PROTOCOL_V1: &str = "1";

/// A single `path -> value` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub value: Value,
}

/// Messages sent to the table server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join/handshake message
    #[serde(rename = "hello")]
    Hello {
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(rename = "supportedProtocolVersions")]
        supported_protocol_versions: Vec<String>,
    },

    /// Write a value
    #[serde(rename = "put")]
    Put { path: String, value: Value },

    /// Remove a value
    #[serde(rename = "delete")]
    Delete { path: String },
}

/// Messages received from the table server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Handshake response
    #[serde(rename = "welcome")]
    Welcome {
        #[serde(rename = "serverId")]
        server_id: String,
        #[serde(rename = "selectedProtocolVersion")]
        selected_protocol_version: String,
    },

    /// Every entry the server holds, sent once after the handshake
    #[serde(rename = "snapshot")]
    Snapshot { entries: Vec<Entry> },

    /// A value changed
    #[serde(rename = "update")]
    Update { path: String, value: Value },

    /// A value was removed
    #[serde(rename = "delete")]
    Delete { path: String },

    /// Error from server
    #[serde(rename = "error")]
    Error { message: String },
}

impl ClientMessage {
    /// Create a hello message
    pub fn hello(client_id: &str) -> Self {
        ClientMessage::Hello {
            client_id: client_id.to_string(),
            supported_protocol_versions: vec![PROTOCOL_V1.to_string()],
        }
    }

    /// Encode message to CBOR bytes
    pub fn encode(&self) -> NtResult<Vec<u8>> {
        encode(self)
    }

    /// Decode message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}

impl ServerMessage {
    /// Create a welcome message
    pub fn welcome(server_id: &str) -> Self {
        ServerMessage::Welcome {
            server_id: server_id.to_string(),
            selected_protocol_version: PROTOCOL_V1.to_string(),
        }
    }

    /// Encode message to CBOR bytes
    pub fn encode(&self) -> NtResult<Vec<u8>> {
        encode(self)
    }

    /// Decode message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}

fn encode<T: Serialize>(message: &T) -> NtResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(message, &mut bytes)
        .map_err(|e| NtError::Protocol(format!("CBOR encoding failed: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_message_encoding() {
        let msg = ClientMessage::hello("ntdash-1234");
        let bytes = msg.encode().unwrap();

        assert!(!bytes.is_empty());
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_put_carries_raw_bytes() {
        let msg = ClientMessage::Put {
            path: "logging-level/Value".to_string(),
            value: Value::Raw(vec![0, 1, 2, 255]),
        };
        let bytes = msg.encode().unwrap();

        match ClientMessage::decode(&bytes).unwrap() {
            ClientMessage::Put { path, value } => {
                assert_eq!(path, "logging-level/Value");
                assert_eq!(value, Value::Raw(vec![0, 1, 2, 255]));
            }
            other => panic!("Expected Put message, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_decoding() {
        let msg = ServerMessage::Snapshot {
            entries: vec![
                Entry {
                    path: "SmartDashboard/time_running".to_string(),
                    value: Value::Bool(true),
                },
                Entry {
                    path: "SmartDashboard/Warnings/CurrentWarnings".to_string(),
                    value: Value::StringArray(vec!["Low battery".to_string()]),
                },
            ],
        };

        let bytes = msg.encode().unwrap();
        match ServerMessage::decode(&bytes).unwrap() {
            ServerMessage::Snapshot { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].value, Value::Bool(true));
            }
            other => panic!("Expected Snapshot message, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ServerMessage::decode(&[0xff, 0x00, 0x13]).is_err());
    }
}
