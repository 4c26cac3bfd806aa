//! Serve command handler

use anyhow::{Context, Result};
use tracing::debug;

use ntdash_core::{Config, WsTableServer};

use crate::output::Output;

/// Run a table server until interrupted
pub async fn serve(config: &Config, bind: Option<String>, output: &Output) -> Result<()> {
    let bind = bind.unwrap_or_else(|| format!("0.0.0.0:{}", config.port));
    let server = WsTableServer::bind(bind.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    let local_addr = server.local_addr()?;
    output.message(&format!("Serving tables on {}", local_addr));

    tokio::select! {
        result = server.run() => result.context("Table server stopped")?,
        _ = tokio::signal::ctrl_c() => debug!("Interrupted"),
    }

    Ok(())
}
