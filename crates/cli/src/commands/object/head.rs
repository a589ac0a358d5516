//! object head - Show object headers
//!
//! Prints the system header and user attributes; `--full-headers` also
//! includes extended headers such as tokens, hashes and signatures.

use clap::Args;
use comfy_table::{Table, presets};
use serde::Serialize;

use ocli_core::{Header, ObjectHeader};

use super::AddressArgs;
use crate::commands::Context;
use crate::exit_code::ExitCode;

/// Show object headers
#[derive(Args, Debug)]
pub struct HeadArgs {
    #[command(flatten)]
    pub address: AddressArgs,

    /// Request all extended headers, not only user attributes
    #[arg(long)]
    pub full_headers: bool,
}

#[derive(Debug, Serialize)]
struct UserAttribute {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct HeadOutput {
    container: String,
    object: String,
    owner: String,
    size_bytes: u64,
    size_human: String,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<String>,
    created_epoch: u64,
    tombstone: bool,
    attributes: Vec<UserAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<Vec<Header>>,
}

impl HeadOutput {
    fn new(header: ObjectHeader, full_headers: bool) -> Self {
        let system = &header.system;
        let created = jiff::Timestamp::from_second(system.created_at.unix_time)
            .ok()
            .filter(|_| system.created_at.unix_time > 0)
            .map(|t| t.strftime("%Y-%m-%d %H:%M:%S").to_string());

        Self {
            container: system.container.to_string(),
            object: system.id.to_string(),
            owner: system.owner.to_string(),
            size_bytes: system.payload_length,
            size_human: humansize::format_size(system.payload_length, humansize::BINARY),
            version: system.version,
            created,
            created_epoch: system.created_at.epoch,
            tombstone: header.is_tombstone(),
            attributes: header
                .user_headers()
                .map(|(key, value)| UserAttribute {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            headers: full_headers.then(|| {
                header
                    .headers
                    .iter()
                    .filter(|h| !matches!(h, Header::User { .. }))
                    .cloned()
                    .collect()
            }),
        }
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(presets::NOTHING);
        table.add_row(vec!["Container", self.container.as_str()]);
        table.add_row(vec!["Object", self.object.as_str()]);
        table.add_row(vec!["Owner", self.owner.as_str()]);
        table.add_row(vec![
            "Size".to_string(),
            format!("{} ({} bytes)", self.size_human, self.size_bytes),
        ]);
        table.add_row(vec!["Version".to_string(), self.version.to_string()]);
        if let Some(created) = &self.created {
            table.add_row(vec![
                "Created".to_string(),
                format!("{created} (epoch {})", self.created_epoch),
            ]);
        }
        if self.tombstone {
            table.add_row(vec!["Tombstone", "yes"]);
        }
        for attr in &self.attributes {
            table.add_row(vec![attr.key.as_str(), attr.value.as_str()]);
        }
        for header in self.headers.iter().flatten() {
            table.add_row(vec!["Header".to_string(), header.to_string()]);
        }
        table
    }
}

/// Execute the head command
pub async fn execute(args: HeadArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let (client, address) = match super::prepare(ctx, &formatter, &args.address).await {
        Ok(p) => p,
        Err(code) => return code,
    };

    let header = match client
        .head(&address, args.full_headers, &ctx.cancel)
        .await
    {
        Ok(h) => h,
        Err(e) => return crate::commands::fail(&formatter, "Failed to fetch header", &e),
    };

    let output = HeadOutput::new(header, args.full_headers);
    if formatter.is_json() {
        formatter.json(&output);
    } else {
        formatter.println(&output.table().to_string());
    }
    ExitCode::Success
}
