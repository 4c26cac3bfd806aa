//! List command handler

use anyhow::{bail, Result};

use ntdash_core::Config;

use super::{connect, open_client};
use crate::output::Output;

/// List the entries and sub-tables of one table
pub async fn list(config: &Config, table: &str, output: &Output) -> Result<()> {
    let (client, _dispatcher) = open_client(config)?;
    connect(&client, config).await?;

    let values = client.get_all_values_in_table(table);
    let sub_tables = client.get_sub_tables(table);
    client.disconnect();

    let Some(values) = values else {
        bail!("Lost connection to {}", config.server_address);
    };
    output.print_table(table, &values, &sub_tables);
    Ok(())
}
