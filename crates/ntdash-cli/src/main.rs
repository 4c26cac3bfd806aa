//! ntdash CLI
//!
//! Command-line interface for ntdash - watch, read and write robot tables.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ntdash_core::{Config, ValueKind};

mod commands;
mod output;

use output::{Output, OutputFormat};

/// Log level used when NTDASH_LOG is not set
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(name = "ntdash")]
#[command(about = "ntdash - Robot dashboard table client")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (overrides NTDASH_CONFIG and default location)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server address (overrides server_address from the config)
    #[arg(short, long, global = true)]
    address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print changes to entries as they arrive
    Watch {
        /// Entries to watch (defaults to the dashboard entries)
        paths: Vec<String>,
    },
    /// Read one entry
    Get {
        /// Entry path, e.g. SmartDashboard/Lift Distance
        path: String,
    },
    /// Write one entry
    Set {
        /// Entry path
        path: String,
        /// Value; arrays are comma-separated, raw values base64
        value: String,
        /// Value kind
        #[arg(short, long, default_value = "string")]
        kind: ValueKind,
    },
    /// List the entries and sub-tables of a table
    #[command(alias = "ls")]
    List {
        /// Table path
        #[arg(default_value = "SmartDashboard")]
        table: String,
    },
    /// Follow the dashboard panels
    Dashboard {
        /// Print one snapshot after connecting and exit
        #[arg(long)]
        once: bool,
    },
    /// Run a table server
    Serve {
        /// Address to listen on (defaults to 0.0.0.0 on the configured port)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_address, port, connect_timeout_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work on the file itself, even when it is broken
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    if let Some(address) = cli.address {
        config.server_address = address;
    }
    init_logging(&config);

    match cli.command {
        Commands::Watch { paths } => commands::watch::watch(&config, paths, &output).await,
        Commands::Get { path } => commands::get::get(&config, &path, &output).await,
        Commands::Set { path, value, kind } => {
            commands::set::set(&config, &path, kind, &value, &output).await
        }
        Commands::List { table } => commands::list::list(&config, &table, &output).await,
        Commands::Dashboard { once } => commands::dashboard::follow(&config, once, &output).await,
        Commands::Serve { bind } => commands::serve::serve(&config, bind, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Initialize logging
///
/// RUST_LOG wins when set; otherwise the level comes from NTDASH_LOG
/// (default: warn). Logs go to config.log_file when set, stderr otherwise.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let log_level =
            std::env::var("NTDASH_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        EnvFilter::new(format!(
            "ntdash_core={},ntdash_cli={}",
            log_level, log_level
        ))
    });

    let Some(log_path) = &config.log_file else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
        return;
    };

    let log_file = match File::create(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init();

    tracing::info!("Logging to {:?}", log_path);
}
