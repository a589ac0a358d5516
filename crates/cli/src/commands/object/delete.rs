//! object delete - Remove an object

use clap::Args;
use serde::Serialize;

use ocli_core::Verb;

use super::AddressArgs;
use crate::commands::Context;
use crate::exit_code::ExitCode;

/// Remove an object
#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub address: AddressArgs,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    status: &'static str,
    container: String,
    object: String,
}

/// Execute the delete command
pub async fn execute(args: DeleteArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let (client, address) = match super::prepare(ctx, &formatter, &args.address).await {
        Ok(p) => p,
        Err(code) => return code,
    };

    let token =
        match super::token_for(&client, ctx, &formatter, Verb::Delete, address.object).await {
            Ok(t) => t,
            Err(code) => return code,
        };

    match client.delete(&token, &address, &ctx.cancel).await {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&DeleteOutput {
                    status: "success",
                    container: address.container.to_string(),
                    object: address.object.to_string(),
                });
            } else {
                formatter.success(&format!("Object {address} removed"));
            }
            ExitCode::Success
        }
        Err(e) => crate::commands::fail(&formatter, "Failed to delete object", &e),
    }
}
