//! Watch command handler

use anyhow::{bail, Result};
use tracing::debug;

use ntdash_core::dashboard::panel_paths;
use ntdash_core::{Config, ConnectionState};

use super::open_client;
use crate::output::Output;

/// Print every change to `paths` until interrupted or disconnected
///
/// Listeners are registered before connecting, so current values are
/// printed once the connection is up.
pub async fn watch(config: &Config, paths: Vec<String>, output: &Output) -> Result<()> {
    let paths = if paths.is_empty() { panel_paths() } else { paths };
    let (client, mut dispatcher) = open_client(config)?;

    for path in &paths {
        let out = *output;
        let watched = path.clone();
        if !client.add_value_listener(path, move |value| out.print_change(&watched, &value))? {
            debug!("Already watching {}", path);
        }
    }

    let out = *output;
    let address = config.server_address.clone();
    client.on_connection(move |connected| out.print_connection(connected, &address));

    let mut attempt = client.spawn_connect(config.server_address.clone());
    let mut connected = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut attempt, if !connected => {
                if !matches!(result, Ok(true)) {
                    bail!(
                        "Could not connect to {}:{}",
                        config.server_address,
                        config.port
                    );
                }
                connected = true;
            }
            alive = dispatcher.next() => {
                if !alive {
                    break;
                }
                if connected && client.status() == ConnectionState::Disconnected {
                    bail!("Connection to {} lost", config.server_address);
                }
            }
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }
        }
    }

    client.disconnect();
    Ok(())
}
