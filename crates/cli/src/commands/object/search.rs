//! object search - Find objects by header values
//!
//! Positional arguments are `key value` pairs matched as regular
//! expressions; `--root` and `--sg` restrict results to root objects and
//! storage groups.

use clap::Args;
use comfy_table::{Table, presets};
use serde::Serialize;

use ocli_core::object::{ROOT_OBJECT_KEY, STORAGE_GROUP_KEY};
use ocli_core::{Address, ContainerId, SearchQuery};

use crate::commands::Context;
use crate::exit_code::ExitCode;

/// Search objects
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Container ID (hex)
    #[arg(long)]
    pub cid: String,

    /// Only root objects
    #[arg(long)]
    pub root: bool,

    /// Only storage groups
    #[arg(long)]
    pub sg: bool,

    /// Header filters as alternating key and value
    #[arg(value_name = "KEY VALUE")]
    pub filters: Vec<String>,
}

impl SearchArgs {
    fn query(&self) -> ocli_core::Result<SearchQuery> {
        let mut query = SearchQuery::from_pairs(&self.filters)?;
        if self.root {
            query = query.with_flag(ROOT_OBJECT_KEY);
        }
        if self.sg {
            query = query.with_flag(STORAGE_GROUP_KEY);
        }
        Ok(query)
    }
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    container: String,
    objects: Vec<String>,
    count: usize,
}

impl SearchOutput {
    fn new(container: &ContainerId, addresses: &[Address]) -> Self {
        let objects: Vec<String> = addresses.iter().map(|a| a.object.to_string()).collect();
        Self {
            container: container.to_string(),
            count: objects.len(),
            objects,
        }
    }
}

/// Execute the search command
pub async fn execute(args: SearchArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let container: ContainerId = match args.cid.parse() {
        Ok(c) => c,
        Err(e) => return crate::commands::fail(&formatter, "Invalid container", &e),
    };
    let query = match args.query() {
        Ok(q) => q,
        Err(e) => return crate::commands::fail(&formatter, "Invalid query", &e),
    };

    let (client, _) = match ctx.client().await {
        Ok(c) => c,
        Err(e) => return crate::commands::fail(&formatter, "Invalid settings", &e),
    };

    let addresses = match client.search(&container, query, &ctx.cancel).await {
        Ok(a) => a,
        Err(e) => return crate::commands::fail(&formatter, "Search failed", &e),
    };

    let output = SearchOutput::new(&container, &addresses);
    if formatter.is_json() {
        formatter.json(&output);
    } else {
        let mut table = Table::new();
        table.load_preset(presets::NOTHING);
        table.set_header(vec!["Object ID"]);
        for object in &output.objects {
            table.add_row(vec![object.as_str()]);
        }
        formatter.println(&format!("Found {} objects", output.count));
        if output.count > 0 {
            formatter.println(&table.to_string());
        }
    }
    ExitCode::Success
}
