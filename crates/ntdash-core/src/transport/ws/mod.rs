//! WebSocket transport
//!
//! A networked table protocol: a client that mirrors the server's entries
//! and a server that keeps the authoritative copy.
//!
//! ## Protocol
//!
//! 1. Connect via WebSocket
//! 2. Send `hello` with client ID and supported versions
//! 3. Receive `welcome`, then a `snapshot` of every entry
//! 4. Exchange `put`/`delete` (client) and `update`/`delete` (server)
//!
//! ## Usage
//!
//! ```ignore
//! let server = WsTableServer::bind("0.0.0.0:1735").await?;
//! tokio::spawn(server.run());
//!
//! let client = SyncClient::new(Arc::new(WsConnector::new()), SyncOptions::default());
//! client.connect("localhost").await;
//! ```

mod client;
mod message;
mod server;

pub use client::{WsConnector, WsTableClient};
pub use message::{ClientMessage, Entry, ServerMessage, PROTOCOL_V1};
pub use server::{ServerHandle, WsTableServer};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::protocol::{
        ClientOptions, ConnectionListener, ConnectionNotice, Connector, TableClient,
    };
    use crate::sync::{SyncClient, SyncOptions};
    use crate::value::Value;

    async fn start_server() -> (ServerHandle, u16) {
        let server = WsTableServer::bind("127.0.0.1:0").await.unwrap();
        let handle = server.handle();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(server.run());
        (handle, port)
    }

    fn options(port: u16, id: &str) -> ClientOptions {
        ClientOptions {
            address: "127.0.0.1".to_string(),
            port,
            client_id: id.to_string(),
        }
    }

    fn quiet() -> ConnectionListener {
        Arc::new(|_notice: ConnectionNotice| {})
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    async fn open_connected(port: u16, id: &str) -> Arc<dyn TableClient> {
        let client = WsConnector::new().open(&options(port, id), quiet());
        wait_until(|| client.is_connected()).await;
        client
    }

    #[tokio::test]
    async fn test_client_receives_snapshot() {
        let (server, port) = start_server().await;
        server.put("SmartDashboard/Lift Distance", 3.5);
        server.put("CameraPublisher/front/streams", vec!["mjpg:http://10.0.0.2:1181/?action=stream".to_string()]);

        let client = open_connected(port, "snapshot").await;

        assert_eq!(
            client.table("SmartDashboard").get_value("Lift Distance"),
            Value::Double(3.5)
        );
        let cameras = client.table("CameraPublisher").sub_tables();
        assert!(cameras.contains("front"));
    }

    #[tokio::test]
    async fn test_put_is_broadcast_to_other_clients() {
        let (server, port) = start_server().await;
        let writer = open_connected(port, "writer").await;
        let reader = open_connected(port, "reader").await;

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        reader
            .table("SmartDashboard/autonomous")
            .add_listener(Arc::new(move |_table, key, value, flags| {
                assert_eq!(key, "selected_position");
                assert_eq!(value, &Value::from("r"));
                assert!(!flags.is_local);
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        assert!(writer
            .table("SmartDashboard")
            .sub_table("autonomous")
            .put_value("selected_position", Value::from("r")));

        wait_until(|| seen.load(Ordering::SeqCst) == 1).await;
        assert_eq!(
            server.get("SmartDashboard/autonomous/selected_position"),
            Value::from("r")
        );
    }

    #[tokio::test]
    async fn test_server_delete_reaches_client() {
        let (server, port) = start_server().await;
        server.put("SmartDashboard/time_running", true);
        let client = open_connected(port, "deleter").await;
        let table = client.table("SmartDashboard");
        assert_eq!(table.get_value("time_running"), Value::Bool(true));

        server.delete("SmartDashboard/time_running");
        wait_until(|| !table.get_value("time_running").is_assigned()).await;
    }

    #[tokio::test]
    async fn test_unreachable_server_never_connects() {
        let drops = Arc::new(AtomicUsize::new(0));
        let counter = drops.clone();
        let listener: ConnectionListener = Arc::new(move |notice: ConnectionNotice| {
            if notice.connected {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Bind and drop to get a port nobody listens on
        let port = {
            let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap().port()
        };
        let client = WsConnector::new().open(&options(port, "lost"), listener);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!client.is_connected());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_sync_client_end_to_end() {
        let (server, port) = start_server().await;
        server.put("SmartDashboard/Lift Distance", 2.0);

        let options = SyncOptions {
            port,
            connect_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            ..SyncOptions::default()
        };
        let client = SyncClient::new(Arc::new(WsConnector::new()), options);
        let mut dispatcher = client.take_dispatcher().unwrap();

        let heights = Arc::new(Mutex::new(Vec::new()));
        let seen = heights.clone();
        client
            .add_double_listener("SmartDashboard/Lift Distance", move |h| {
                seen.lock().unwrap().push(h)
            })
            .unwrap();

        assert!(client.connect("127.0.0.1").await);
        dispatcher.dispatch_pending();
        assert_eq!(*heights.lock().unwrap(), vec![2.0]);

        server.put("SmartDashboard/Lift Distance", 4.0);
        tokio::time::timeout(Duration::from_secs(2), async {
            while heights.lock().unwrap().len() < 2 {
                dispatcher.next().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(heights.lock().unwrap().last(), Some(&4.0));

        assert!(client.set_string("SmartDashboard/autonomous/selected_position", "c"));
        wait_until(|| server.get("SmartDashboard/autonomous/selected_position") == Value::from("c"))
            .await;

        client.disconnect();
        assert!(!client.is_connected());
    }
}
