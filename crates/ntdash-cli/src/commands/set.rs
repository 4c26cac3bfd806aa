//! Set command handler

use std::time::Duration;

use anyhow::{bail, Context, Result};

use ntdash_core::{Config, Value, ValueKind};

use super::{connect, open_client};
use crate::output::Output;

/// Time given to the connection task to send a queued write before closing
const FLUSH_GRACE: Duration = Duration::from_millis(250);

/// Write one entry
pub async fn set(
    config: &Config,
    path: &str,
    kind: ValueKind,
    input: &str,
    output: &Output,
) -> Result<()> {
    let value = Value::parse_as(kind, input).context("Invalid value")?;

    let (client, _dispatcher) = open_client(config)?;
    connect(&client, config).await?;

    let written = client.set_value(path, value.clone());
    if matches!(written, Ok(true)) {
        tokio::time::sleep(FLUSH_GRACE).await;
    }
    client.disconnect();

    if !written? {
        bail!("Not connected to {}, write dropped", config.server_address);
    }
    output.success(&format!("Set {} = {} ({})", path, value, kind));
    Ok(())
}
