//! object get-range-hash - Fetch homomorphic hashes of payload ranges
//!
//! With `--verify`, the remote hashes of all ranges are fetched in one
//! request and each is compared with the hash of the same salted range of a
//! local file.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use ocli_core::object::parse_ranges;
use ocli_core::{Hash, Range, Verification};

use super::AddressArgs;
use crate::commands::Context;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Fetch range hashes
#[derive(Args, Debug)]
pub struct GetRangeHashArgs {
    #[command(flatten)]
    pub address: AddressArgs,

    /// Salt XOR-ed into the payload before hashing (hex)
    #[arg(long, value_parser = parse_salt, default_value = "")]
    pub salt: SaltArg,

    /// Compare hashes with a local file
    #[arg(long, requires = "file")]
    pub verify: bool,

    /// Local copy of the payload
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Ranges in offset:length form
    #[arg(required = true, value_name = "OFFSET:LENGTH")]
    pub ranges: Vec<String>,
}

/// Decoded `--salt` value
#[derive(Debug, Clone, Default)]
pub struct SaltArg(pub Vec<u8>);

fn parse_salt(s: &str) -> Result<SaltArg, String> {
    hex::decode(s.trim_start_matches("0x"))
        .map(SaltArg)
        .map_err(|e| format!("invalid salt '{s}': {e}"))
}

#[derive(Debug, Serialize)]
struct RangeHashOutput {
    range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<Hash>,
    #[serde(flatten)]
    verification: Option<Verification>,
}

impl RangeHashOutput {
    fn line(&self, formatter: &Formatter) -> String {
        let hash = self
            .hash
            .or_else(|| self.verification.as_ref().and_then(|v| v.remote))
            .map(|h| h.to_string())
            .unwrap_or_default();
        match &self.verification {
            None => format!("{}: {hash}", self.range),
            Some(v) => {
                let mut line = format!("({}) {hash}", formatter.verdict(v.valid));
                if let Some(message) = &v.message {
                    line.push_str(&formatter.dim(&format!(" [{}: {message}]", self.range)));
                }
                line
            }
        }
    }
}

async fn verify_ranges(
    client: &crate::commands::Client,
    ctx: &Context,
    address: &ocli_core::Address,
    ranges: &[Range],
    salt: &[u8],
    file: &std::path::Path,
) -> ocli_core::Result<Vec<RangeHashOutput>> {
    let mut local = tokio::fs::File::open(file).await?;
    let verifications = client
        .verify_ranges(None, address, ranges, salt, &mut local, &ctx.cancel)
        .await?;
    Ok(ranges
        .iter()
        .zip(verifications)
        .map(|(range, verification)| RangeHashOutput {
            range: range.to_string(),
            hash: None,
            verification: Some(verification),
        })
        .collect())
}

/// Execute the get-range-hash command
pub async fn execute(args: GetRangeHashArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let ranges = match parse_ranges(&args.ranges) {
        Ok(r) => r,
        Err(e) => return crate::commands::fail(&formatter, "Invalid range", &e),
    };
    let (client, address) = match super::prepare(ctx, &formatter, &args.address).await {
        Ok(p) => p,
        Err(code) => return code,
    };
    let salt = &args.salt.0;

    let outputs = match (&args.file, args.verify) {
        (Some(file), true) => {
            match verify_ranges(&client, ctx, &address, &ranges, salt, file).await {
                Ok(o) => o,
                Err(e) => return crate::commands::fail(&formatter, "Can't verify ranges", &e),
            }
        }
        _ => match client
            .range_hashes(None, &address, &ranges, salt, &ctx.cancel)
            .await
        {
            Ok(hashes) => ranges
                .iter()
                .zip(hashes)
                .map(|(range, hash)| RangeHashOutput {
                    range: range.to_string(),
                    hash: Some(hash),
                    verification: None,
                })
                .collect(),
            Err(e) => return crate::commands::fail(&formatter, "Failed to get range hashes", &e),
        },
    };

    if formatter.is_json() {
        formatter.json(&outputs);
    } else {
        for output in &outputs {
            formatter.println(&output.line(&formatter));
        }
    }

    let all_valid = outputs
        .iter()
        .all(|o| o.verification.as_ref().is_none_or(|v| v.valid));
    if all_valid {
        ExitCode::Success
    } else {
        ExitCode::GeneralError
    }
}
