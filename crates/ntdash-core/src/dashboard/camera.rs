//! Camera directory
//!
//! Cameras publish themselves under `CameraPublisher/<name>`, with their
//! stream URLs in `streams` and their settings in the `Property` sub-table.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::sync::SyncClient;
use crate::value::Value;

pub const CAMERA_TABLE: &str = "CameraPublisher";
pub const STREAMS_KEY: &str = "streams";
pub const PROPERTY_TABLE: &str = "Property";

const STREAM_PREFIX: &str = "mjpg:";

#[derive(Default)]
struct CameraState {
    available: Vec<String>,
    selected: Option<String>,
}

/// Lists published cameras and picks one to show
#[derive(Clone)]
pub struct CameraDirectory {
    client: SyncClient,
    state: Arc<Mutex<CameraState>>,
}

impl CameraDirectory {
    /// Refreshes the camera list on every connect and clears it on disconnect
    pub fn new(client: SyncClient) -> Self {
        let directory = Self {
            client: client.clone(),
            state: Arc::new(Mutex::new(CameraState::default())),
        };

        let handle = directory.clone();
        client.on_connection(move |connected| {
            if connected {
                handle.refresh();
            } else {
                *handle.lock() = CameraState::default();
            }
        });
        directory
    }

    fn lock(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-read the camera list; a lone camera is selected automatically
    pub fn refresh(&self) -> Vec<String> {
        let cameras = self.client.get_sub_tables(CAMERA_TABLE);
        debug!("Found {} cameras", cameras.len());

        let mut state = self.lock();
        if cameras.len() == 1 {
            state.selected = cameras.first().cloned();
        } else if let Some(selected) = &state.selected {
            if !cameras.contains(selected) {
                state.selected = None;
            }
        }
        state.available = cameras.clone();
        cameras
    }

    pub fn available(&self) -> Vec<String> {
        self.lock().available.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    /// Select a camera by name; false if it is not published
    pub fn select(&self, camera: &str) -> bool {
        let mut state = self.lock();
        if !state.available.iter().any(|c| c == camera) {
            return false;
        }
        state.selected = Some(camera.to_string());
        true
    }

    /// Stream URL of `camera`
    pub fn stream_url(&self, camera: &str) -> Option<String> {
        if camera.is_empty() {
            return None;
        }
        let streams = self
            .client
            .get_string_array(&format!("{}/{}/{}", CAMERA_TABLE, camera, STREAMS_KEY))?;
        stream_url_from(&streams)
    }

    /// Settings page of `camera`
    pub fn settings_url(&self, camera: &str) -> Option<String> {
        settings_url_from(&self.stream_url(camera)?)
    }

    /// Values of the camera's `Property` table
    pub fn properties(&self, camera: &str) -> Option<BTreeMap<String, Value>> {
        self.client
            .get_all_values_in_table(&format!("{}/{}/{}", CAMERA_TABLE, camera, PROPERTY_TABLE))
    }
}

/// First stream entry with its `mjpg:` scheme prefix removed
pub fn stream_url_from(streams: &[String]) -> Option<String> {
    let first = streams.first()?;
    Some(first.replace(STREAM_PREFIX, ""))
}

/// Stream URL up to its last `/`
pub fn settings_url_from(stream_url: &str) -> Option<String> {
    if stream_url.is_empty() {
        return None;
    }
    let end = stream_url.rfind('/')?;
    Some(stream_url[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncOptions;
    use crate::transport::MemoryServer;

    #[test]
    fn test_stream_url() {
        let streams = vec![
            "mjpg:http://10.0.0.2:1181/?action=stream".to_string(),
            "mjpg:http://roborio-frc.local:1181/?action=stream".to_string(),
        ];
        assert_eq!(
            stream_url_from(&streams).as_deref(),
            Some("http://10.0.0.2:1181/?action=stream")
        );
        assert_eq!(stream_url_from(&[]), None);
    }

    #[test]
    fn test_settings_url() {
        assert_eq!(
            settings_url_from("http://10.0.0.2:1181/?action=stream").as_deref(),
            Some("http://10.0.0.2:1181")
        );
        assert_eq!(settings_url_from(""), None);
        assert_eq!(settings_url_from("no-slash"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_tracks_connection() {
        let server = MemoryServer::new("10.0.0.2");
        server.put(
            "CameraPublisher/front/streams",
            vec!["mjpg:http://10.0.0.2:1181/?action=stream".to_string()],
        );
        server.put("CameraPublisher/front/Property/brightness", 50.0);
        server.put("CameraPublisher/front/Property/white_balance", "auto");

        let client = SyncClient::new(Arc::new(server.connector()), SyncOptions::default());
        let mut dispatcher = client.take_dispatcher().unwrap();
        let cameras = CameraDirectory::new(client.clone());

        assert!(client.connect("10.0.0.2").await);
        dispatcher.dispatch_pending();

        assert_eq!(cameras.available(), vec!["front"]);
        assert_eq!(cameras.selected().as_deref(), Some("front"));
        assert_eq!(
            cameras.settings_url("front").as_deref(),
            Some("http://10.0.0.2:1181")
        );
        let properties = cameras.properties("front").unwrap();
        assert_eq!(properties["brightness"], Value::Double(50.0));
        assert!(!cameras.select("rear"));

        client.disconnect();
        dispatcher.dispatch_pending();
        assert!(cameras.available().is_empty());
        assert!(cameras.selected().is_none());
        assert!(cameras.stream_url("front").is_none());
    }
}
