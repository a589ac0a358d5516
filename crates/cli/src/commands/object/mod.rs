//! object command - Object manipulation
//!
//! Every subcommand resolves connection settings, builds a client and runs
//! one or more requests against the node. Mutating and streaming commands
//! first negotiate a session token scoped to the objects they touch.

use clap::{Args, Subcommand};

use ocli_core::{Address, ObjectId, SessionRequest, Token, Verb};

use super::{Client, Context};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

pub(crate) mod delete;
mod get;
mod get_range;
mod get_range_hash;
pub(crate) mod head;
mod put;
pub(crate) mod search;

#[derive(Subcommand, Debug)]
pub enum ObjectCommands {
    /// Upload one or more files as new objects
    Put(put::PutArgs),

    /// Download an object into a file
    Get(get::GetArgs),

    /// Remove an object
    Delete(delete::DeleteArgs),

    /// Show object headers
    Head(head::HeadArgs),

    /// Search objects in a container by header values
    Search(search::SearchArgs),

    /// Fetch payload ranges of an object
    GetRange(get_range::GetRangeArgs),

    /// Fetch homomorphic hashes of payload ranges
    GetRangeHash(get_range_hash::GetRangeHashArgs),
}

/// Container and object identifiers of a stored object
#[derive(Args, Debug, Clone)]
pub struct AddressArgs {
    /// Container ID (hex)
    #[arg(long)]
    pub cid: String,

    /// Object ID (UUID)
    #[arg(long)]
    pub oid: String,
}

impl AddressArgs {
    pub fn address(&self) -> ocli_core::Result<Address> {
        Address::parse(&self.cid, &self.oid)
    }
}

/// Execute an object subcommand
pub async fn execute(cmd: ObjectCommands, ctx: &Context) -> ExitCode {
    match cmd {
        ObjectCommands::Put(args) => put::execute(args, ctx).await,
        ObjectCommands::Get(args) => get::execute(args, ctx).await,
        ObjectCommands::Delete(args) => delete::execute(args, ctx).await,
        ObjectCommands::Head(args) => head::execute(args, ctx).await,
        ObjectCommands::Search(args) => search::execute(args, ctx).await,
        ObjectCommands::GetRange(args) => get_range::execute(args, ctx).await,
        ObjectCommands::GetRangeHash(args) => get_range_hash::execute(args, ctx).await,
    }
}

/// Parse the address and build a client, reporting failures
pub(crate) async fn prepare(
    ctx: &Context,
    formatter: &Formatter,
    args: &AddressArgs,
) -> Result<(Client, Address), ExitCode> {
    let address = args
        .address()
        .map_err(|e| super::fail(formatter, "Invalid address", &e))?;
    let (client, _) = ctx
        .client()
        .await
        .map_err(|e| super::fail(formatter, "Invalid settings", &e))?;
    Ok((client, address))
}

/// Negotiate a token for `verb` on a single object
pub(crate) async fn token_for(
    client: &Client,
    ctx: &Context,
    formatter: &Formatter,
    verb: Verb,
    object: ObjectId,
) -> Result<Token, ExitCode> {
    client
        .negotiate(SessionRequest::new(verb, [object]), &ctx.cancel)
        .await
        .map_err(|e| super::fail(formatter, "Can't create session token", &e))
}
