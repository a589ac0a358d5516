//! CLI command definitions and execution
//!
//! This module contains all CLI commands and their implementations.
//! Commands share a [`Context`] carrying the global flags, the output
//! configuration and the process-wide cancellation token.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use ocli_core::config::ConfigManager;
use ocli_core::{KeyIdentity, ObjectClient, Overrides, Settings, SettingsManager};
use ocli_net::TcpConnector;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

pub mod object;
mod set;
mod sg;

/// Client bound to a TCP node
pub type Client = ObjectClient<TcpConnector, KeyIdentity>;

/// ocli - object storage network client
///
/// Stores, fetches and verifies objects on a storage node using
/// session tokens and homomorphic payload hashes.
#[derive(Parser, Debug)]
#[command(name = "ocli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Storage node address (host:port)
    #[arg(long, global = true, env = "OCLI_HOST")]
    pub host: Option<String>,

    /// Private key: hex string or path to a key file
    #[arg(long, global = true, env = "OCLI_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Request time-to-live
    #[arg(long, global = true)]
    pub ttl: Option<u32>,

    /// Configuration file path
    #[arg(long, global = true, env = ocli_core::config::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set default values for key or host
    #[command(subcommand)]
    Set(set::SetCommands),

    /// Object manipulation
    #[command(subcommand)]
    Object(object::ObjectCommands),

    /// Storage group manipulation
    #[command(subcommand)]
    Sg(sg::SgCommands),
}

/// Shared state for one command invocation
#[derive(Debug, Clone)]
pub struct Context {
    pub overrides: Overrides,
    pub config_path: Option<PathBuf>,
    pub output: OutputConfig,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.output.clone())
    }

    pub fn settings_manager(&self) -> ocli_core::Result<SettingsManager> {
        Ok(SettingsManager::with_config_manager(
            ConfigManager::from_option(self.config_path.clone())?,
        ))
    }

    /// Resolve connection settings and build a client for them
    pub async fn client(&self) -> ocli_core::Result<(Client, Settings)> {
        let settings = self
            .settings_manager()?
            .resolve(&self.overrides)
            .await?;
        let connector = TcpConnector::new(
            settings.host,
            settings.ttl,
            Duration::from_millis(settings.transfer.connect_timeout_ms),
        );
        tracing::debug!(host = %settings.host, ttl = settings.ttl, "Client configured");
        let client = ObjectClient::new(connector, settings.identity.clone());
        Ok((client, settings))
    }
}

/// Build the command context from parsed flags
pub fn context(cli: &Cli, cancel: CancellationToken) -> Context {
    let output = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };

    // Config errors surface again when the command loads settings
    let output = match ConfigManager::from_option(cli.config.clone()).and_then(|m| m.load()) {
        Ok(config) => output.with_defaults(&config.defaults),
        Err(_) => output,
    };

    Context {
        overrides: Overrides {
            host: cli.host.clone(),
            key: cli.key.clone(),
            ttl: cli.ttl,
        },
        config_path: cli.config.clone(),
        output,
        cancel,
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli, cancel: CancellationToken) -> ExitCode {
    let ctx = context(&cli, cancel);

    match cli.command {
        Commands::Set(cmd) => set::execute(cmd, &ctx).await,
        Commands::Object(cmd) => object::execute(cmd, &ctx).await,
        Commands::Sg(cmd) => sg::execute(cmd, &ctx).await,
    }
}

/// Report `err` and map it to an exit code
pub(crate) fn fail(formatter: &Formatter, context: &str, err: &ocli_core::Error) -> ExitCode {
    if err.is_canceled() {
        formatter.error("Interrupted");
    } else {
        formatter.error(&format!("{context}: {err}"));
    }
    ExitCode::from_error(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ocli",
            "object",
            "head",
            "--cid",
            "00",
            "--oid",
            "x",
            "--host",
            "127.0.0.1:8080",
            "--ttl",
            "5",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(cli.ttl, Some(5));
        assert!(cli.json);
    }

    #[test]
    fn test_context_carries_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("config.toml");
        let cli = Cli::try_parse_from([
            "ocli",
            "--config",
            config.to_str().unwrap(),
            "--key",
            "abc",
            "set",
            "host",
            ":8080",
        ])
        .unwrap();

        let ctx = context(&cli, CancellationToken::new());
        assert_eq!(ctx.overrides.key.as_deref(), Some("abc"));
        assert_eq!(ctx.config_path.as_deref(), Some(config.as_path()));
        assert!(!ctx.output.json);
    }
}
