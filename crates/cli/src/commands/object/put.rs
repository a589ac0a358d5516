//! object put - Upload files as new objects
//!
//! Each file becomes its own object with a fresh ID, uploaded under a
//! token negotiated for that ID alone.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use ocli_core::object::parse_user_headers;
use ocli_core::transfer::check_chunk_size;
use ocli_core::{ContainerId, Hash, ObjectId, UploadOptions, Verb, Verification};

use crate::commands::Context;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Upload files
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Container ID (hex)
    #[arg(long)]
    pub cid: String,

    /// File to upload; may be repeated and may be a glob pattern
    #[arg(long = "file", required = true)]
    pub files: Vec<String>,

    /// Check the stored payload hash after upload
    #[arg(long)]
    pub verify: bool,

    /// User header in key=value form; may be repeated
    #[arg(long = "user", value_name = "KEY=VALUE")]
    pub user: Vec<String>,

    /// Fail when the streamed size differs from the size declared up front
    #[arg(long)]
    pub strict_length: bool,

    /// Upload chunk size in bytes (overrides config)
    #[arg(long, value_parser = parse_chunk_size)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    file: String,
    container: String,
    object: String,
    size_bytes: u64,
    chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_hash: Option<Hash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification: Option<Verification>,
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .parse()
        .map_err(|e| format!("invalid chunk size '{s}': {e}"))?;
    check_chunk_size(size).map_err(|e| e.to_string())
}

/// Expand glob patterns; a pattern that matches nothing is kept verbatim so
/// the open error names it.
fn expand_files(patterns: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    for pattern in patterns {
        let paths = glob::glob(pattern).map_err(|e| format!("Invalid pattern '{pattern}': {e}"))?;
        let before = files.len();
        for path in paths {
            let path = path.map_err(|e| format!("Can't read '{pattern}': {e}"))?;
            if path.is_file() {
                files.push(path);
            }
        }
        if files.len() == before {
            files.push(PathBuf::from(pattern));
        }
    }
    Ok(files)
}

/// Execute the put command
pub async fn execute(args: PutArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let container: ContainerId = match args.cid.parse() {
        Ok(c) => c,
        Err(e) => return crate::commands::fail(&formatter, "Invalid container", &e),
    };

    let files = match expand_files(&args.files) {
        Ok(f) => f,
        Err(e) => {
            formatter.error(&e);
            return ExitCode::UsageError;
        }
    };

    let (client, settings) = match ctx.client().await {
        Ok(c) => c,
        Err(e) => return crate::commands::fail(&formatter, "Invalid settings", &e),
    };

    let options = UploadOptions {
        chunk_size: args.chunk_size.unwrap_or(settings.transfer.chunk_size),
        hash: true,
        strict_length: args.strict_length,
    };
    let headers = parse_user_headers(&args.user);

    let mut outputs = Vec::with_capacity(files.len());
    let mut all_valid = true;
    for path in &files {
        let display = path.display().to_string();
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) => {
                formatter.error(&format!("Can't open '{display}': {e}"));
                return ExitCode::GeneralError;
            }
        };
        let size = match file.metadata().await {
            Ok(m) => m.len(),
            Err(e) => {
                formatter.error(&format!("Can't stat '{display}': {e}"));
                return ExitCode::GeneralError;
            }
        };

        let id = ObjectId::random();
        let token = match super::token_for(&client, ctx, &formatter, Verb::Put, id).await {
            Ok(t) => t,
            Err(code) => return code,
        };

        let header = client.object_header(id, container, size, headers.clone());
        let progress = ProgressBar::new(formatter.config(), &display);
        let report = match client
            .upload(
                &token,
                header,
                &mut file,
                &options,
                args.verify,
                &progress,
                &ctx.cancel,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return crate::commands::fail(
                    &formatter,
                    &format!("Failed to upload '{display}'"),
                    &e,
                );
            }
        };
        progress.finish_and_clear();

        if let Some(verification) = &report.verification {
            all_valid &= verification.valid;
        }
        let output = PutOutput {
            file: display,
            container: report.address.container.to_string(),
            object: report.address.object.to_string(),
            size_bytes: report.bytes_sent,
            chunks: report.chunks,
            payload_hash: report.payload_hash,
            verification: report.verification,
        };
        if !formatter.is_json() {
            print_human(&formatter, &output);
        }
        outputs.push(output);
    }

    if formatter.is_json() {
        formatter.json(&outputs);
    }

    if all_valid {
        ExitCode::Success
    } else {
        ExitCode::GeneralError
    }
}

fn print_human(formatter: &Formatter, output: &PutOutput) {
    formatter.success(&format!(
        "Uploaded '{}' as {}/{} ({} bytes)",
        output.file, output.container, output.object, output.size_bytes
    ));
    if let Some(v) = &output.verification {
        let mut line = format!("  verification: {}", formatter.verdict(v.valid));
        if let Some(message) = &v.message {
            line.push_str(&formatter.dim(&format!(" ({message})")));
        }
        formatter.println(&line);
    }
}
