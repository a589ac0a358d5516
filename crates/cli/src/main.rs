//! ocli - object storage network client
//!
//! A command-line interface for storing, fetching and verifying objects on
//! a storage node.

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ocli::commands::{self, Cli};
use ocli::shutdown;
use ocli_core::config::{ConfigManager, TransferSettings};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let grace_ms = ConfigManager::from_option(cli.config.clone())
        .and_then(|m| m.load())
        .map(|c| c.transfer.shutdown_grace_ms)
        .unwrap_or_else(|_| TransferSettings::default().shutdown_grace_ms);

    let cancel = CancellationToken::new();
    shutdown::install(cancel.clone(), Duration::from_millis(grace_ms));

    let exit_code = commands::execute(cli, cancel).await;

    std::process::exit(exit_code.as_i32());
}
