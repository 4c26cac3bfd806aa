//! Get command handler

use anyhow::Result;

use ntdash_core::Config;

use super::{connect, open_client};
use crate::output::Output;

/// Read one entry and print it
pub async fn get(config: &Config, path: &str, output: &Output) -> Result<()> {
    let (client, _dispatcher) = open_client(config)?;
    connect(&client, config).await?;

    let value = client.get_value(path);
    client.disconnect();

    output.print_value(path, &value?);
    Ok(())
}
