//! set command - Persist default connection settings
//!
//! Stores the private key or node address in the configuration file so
//! later commands can omit `--key` and `--host`.

use clap::Subcommand;
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;

#[derive(Subcommand, Debug)]
pub enum SetCommands {
    /// Set the default private key (hex string or key file path)
    Key {
        /// Private key
        key: String,
    },

    /// Set the default node address (host:port)
    Host {
        /// Node address
        addr: String,
    },
}

#[derive(Debug, Serialize)]
struct SetOutput {
    status: &'static str,
    setting: &'static str,
    value: String,
}

/// Execute a set subcommand
pub async fn execute(cmd: SetCommands, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let manager = match ctx.settings_manager() {
        Ok(m) => m,
        Err(e) => return super::fail(&formatter, "Failed to open configuration", &e),
    };

    let (setting, result) = match cmd {
        SetCommands::Key { key } => ("key", manager.set_key(&key).map(|owner| owner.to_string())),
        SetCommands::Host { addr } => (
            "host",
            manager.set_host(&addr).await.map(|a| a.to_string()),
        ),
    };

    match result {
        Ok(value) => {
            if formatter.is_json() {
                formatter.json(&SetOutput {
                    status: "success",
                    setting,
                    value,
                });
            } else if setting == "key" {
                formatter.success(&format!("Private key saved (owner {value})"));
            } else {
                formatter.success(&format!("Node address set to {value}"));
            }
            ExitCode::Success
        }
        Err(e) => super::fail(&formatter, &format!("Can't set {setting}"), &e),
    }
}
