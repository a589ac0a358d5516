//! object get-range - Fetch payload fragments
//!
//! Fragments are written back to back, in the order the ranges were given,
//! to `--file` or standard output. JSON mode prints them hex encoded.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use ocli_core::Range;
use ocli_core::object::parse_ranges;

use super::AddressArgs;
use crate::commands::Context;
use crate::exit_code::ExitCode;

/// Fetch payload ranges
#[derive(Args, Debug)]
pub struct GetRangeArgs {
    #[command(flatten)]
    pub address: AddressArgs,

    /// Write fragments to a file instead of standard output
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Ranges in offset:length form
    #[arg(required = true, value_name = "OFFSET:LENGTH")]
    pub ranges: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Fragment {
    range: String,
    data: String,
}

fn fragments(ranges: &[Range], data: &[Vec<u8>]) -> Vec<Fragment> {
    ranges
        .iter()
        .zip(data)
        .map(|(range, bytes)| Fragment {
            range: range.to_string(),
            data: hex::encode(bytes),
        })
        .collect()
}

/// Execute the get-range command
pub async fn execute(args: GetRangeArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let ranges = match parse_ranges(&args.ranges) {
        Ok(r) => r,
        Err(e) => return crate::commands::fail(&formatter, "Invalid range", &e),
    };
    let (client, address) = match super::prepare(ctx, &formatter, &args.address).await {
        Ok(p) => p,
        Err(code) => return code,
    };

    let data = match client.get_ranges(&address, &ranges, &ctx.cancel).await {
        Ok(d) => d,
        Err(e) => return crate::commands::fail(&formatter, "Failed to get ranges", &e),
    };
    if data.len() != ranges.len() {
        formatter.warning(&format!(
            "requested {} ranges, received {}",
            ranges.len(),
            data.len()
        ));
    }

    if formatter.is_json() && args.file.is_none() {
        formatter.json(&fragments(&ranges, &data));
        return ExitCode::Success;
    }

    let result = match &args.file {
        Some(path) => tokio::fs::write(path, data.concat()).await,
        None => {
            let mut stdout = tokio::io::stdout();
            match stdout.write_all(&data.concat()).await {
                Ok(()) => stdout.flush().await,
                Err(e) => Err(e),
            }
        }
    };
    if let Err(e) = result {
        formatter.error(&format!("Can't write fragments: {e}"));
        return ExitCode::GeneralError;
    }

    if let Some(path) = &args.file {
        let total: usize = data.iter().map(Vec::len).sum();
        formatter.success(&format!(
            "{} fragments ({total} bytes) written to '{}'",
            data.len(),
            path.display()
        ));
    }
    ExitCode::Success
}
