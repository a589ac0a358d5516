//! object get - Download an object into a file
//!
//! The payload is streamed into a scratch file next to the destination and
//! moved into place only after the whole object arrived. A failed or removed
//! object leaves an existing destination untouched.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use ocli_core::Verb;

use super::AddressArgs;
use crate::commands::Context;
use crate::exit_code::ExitCode;
use crate::output::ProgressBar;

/// Download an object
#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub address: AddressArgs,

    /// Destination file
    #[arg(long)]
    pub file: PathBuf,

    /// Permissions of the created file, in octal
    #[arg(long, default_value = "0600", value_parser = parse_perm)]
    pub perm: u32,
}

#[derive(Debug, Serialize)]
struct GetOutput {
    container: String,
    object: String,
    file: String,
    size_bytes: u64,
}

fn parse_perm(s: &str) -> Result<u32, String> {
    let mode = u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode '{s}': {e}"))?;
    if mode > 0o7777 {
        return Err(format!("mode '{s}' out of range"));
    }
    Ok(mode)
}

/// Scratch file in the destination's directory, removed when dropped
fn scratch_for(target: &Path) -> std::io::Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tempfile::Builder::new().prefix(".ocli-get-").tempfile_in(dir)
}

/// Apply `perm` and move the scratch file over `target`
async fn persist(scratch: NamedTempFile, target: &Path, perm: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(scratch.path(), std::fs::Permissions::from_mode(perm)).await?;
    }
    #[cfg(not(unix))]
    let _ = perm;
    scratch.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Execute the get command
pub async fn execute(args: GetArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let (client, address) = match super::prepare(ctx, &formatter, &args.address).await {
        Ok(p) => p,
        Err(code) => return code,
    };

    let token =
        match super::token_for(&client, ctx, &formatter, Verb::Get, address.object).await {
            Ok(t) => t,
            Err(code) => return code,
        };

    let shown = args.file.display().to_string();
    let opened = scratch_for(&args.file)
        .and_then(|scratch| Ok((scratch.as_file().try_clone()?, scratch)));
    let (file, scratch) = match opened {
        Ok(o) => o,
        Err(e) => {
            formatter.error(&format!("Can't write to '{shown}': {e}"));
            return ExitCode::GeneralError;
        }
    };
    let mut file = tokio::fs::File::from_std(file);

    let progress = ProgressBar::new(formatter.config(), &shown);
    let result = client
        .download(&token, &address, &mut file, &progress, &ctx.cancel)
        .await;
    progress.finish_and_clear();

    let outcome = match result {
        Ok(o) => o,
        Err(e) => {
            tracing::debug!(scratch = ?scratch.path(), "Discarding partial download");
            return crate::commands::fail(&formatter, "Failed to get object", &e);
        }
    };
    let flushed = file.shutdown().await;
    drop(file);
    let finished = match flushed {
        Ok(()) => persist(scratch, &args.file, args.perm).await,
        Err(e) => Err(e),
    };
    if let Err(e) = finished {
        formatter.error(&format!("Can't finish writing '{shown}': {e}"));
        return ExitCode::GeneralError;
    }

    if formatter.is_json() {
        formatter.json(&GetOutput {
            container: address.container.to_string(),
            object: address.object.to_string(),
            file: shown,
            size_bytes: outcome.bytes_written,
        });
    } else {
        formatter.success(&format!(
            "Object {address} written to '{shown}' ({} bytes)",
            outcome.bytes_written
        ));
    }
    ExitCode::Success
}
