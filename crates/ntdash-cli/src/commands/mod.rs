//! Command handlers

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use ntdash_core::{Config, Dispatcher, SyncClient, WsConnector};

pub mod config;
pub mod dashboard;
pub mod get;
pub mod list;
pub mod serve;
pub mod set;
pub mod watch;

/// Client over WebSocket, configured from `config`
pub fn open_client(config: &Config) -> Result<(SyncClient, Dispatcher)> {
    let client = SyncClient::new(Arc::new(WsConnector::new()), config.client_options());
    let dispatcher = client
        .take_dispatcher()
        .context("Dispatcher already taken")?;
    Ok((client, dispatcher))
}

/// Connect to the configured server, failing if it never acknowledges
pub async fn connect(client: &SyncClient, config: &Config) -> Result<()> {
    if !client.connect(&config.server_address).await {
        bail!(
            "Could not connect to {}:{} within {}s",
            config.server_address,
            config.port,
            config.connect_timeout_secs
        );
    }
    Ok(())
}
