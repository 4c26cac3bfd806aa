//! Dashboard command handler

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::debug;

use ntdash_core::{Config, ConnectionState, Dashboard};

use super::{connect, open_client};
use crate::output::Output;

/// Follow every panel, printing a snapshot each second
pub async fn follow(config: &Config, once: bool, output: &Output) -> Result<()> {
    let (client, mut dispatcher) = open_client(config)?;
    let dashboard = Dashboard::new(&client, config)?;

    connect(&client, config).await?;
    dispatcher.dispatch_pending();

    if once {
        output.print_snapshot(&dashboard.snapshot());
        client.disconnect();
        return Ok(());
    }

    let mut clock = tokio::time::interval(Duration::from_secs(1));
    let mut elapsed: u64 = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = clock.tick() => {
                dashboard.tick(elapsed);
                elapsed += 1;
                output.print_snapshot(&dashboard.snapshot());
            }
            alive = dispatcher.next() => {
                if !alive {
                    break;
                }
                if client.status() == ConnectionState::Disconnected {
                    output.print_snapshot(&dashboard.snapshot());
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
