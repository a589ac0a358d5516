//! sg command - Storage group manipulation
//!
//! A storage group is a header-only object that links member objects of
//! one container. Listing, inspecting and removing groups run the object
//! search, head and delete commands with the group flags set.

use clap::{Args, Subcommand};
use serde::Serialize;

use ocli_core::{ContainerId, ObjectId, Verb};

use super::Context;
use super::object::{AddressArgs, delete, head, search, token_for};
use crate::exit_code::ExitCode;

#[derive(Subcommand, Debug)]
pub enum SgCommands {
    /// Create a storage group over existing objects
    Put(PutArgs),

    /// Show a storage group with all its headers
    Get(GroupArgs),

    /// List storage groups in a container
    List(ListArgs),

    /// Remove a storage group
    Delete(GroupArgs),
}

/// Create a storage group
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Container ID (hex)
    #[arg(long)]
    pub cid: String,

    /// Member object ID; may be repeated
    #[arg(long = "oid", required = true)]
    pub oids: Vec<String>,
}

/// Address of one storage group
#[derive(Args, Debug)]
pub struct GroupArgs {
    /// Container ID (hex)
    #[arg(long)]
    pub cid: String,

    /// Storage group ID (UUID)
    #[arg(long)]
    pub sgid: String,
}

impl GroupArgs {
    fn address(self) -> AddressArgs {
        AddressArgs {
            cid: self.cid,
            oid: self.sgid,
        }
    }
}

/// List storage groups
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Container ID (hex)
    #[arg(long)]
    pub cid: String,

    /// Header filters as alternating key and value
    #[arg(value_name = "KEY VALUE")]
    pub filters: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SgPutOutput {
    container: String,
    storage_group: String,
    members: Vec<String>,
}

fn parse_members(oids: &[String]) -> ocli_core::Result<Vec<ObjectId>> {
    oids.iter().map(|s| s.parse()).collect()
}

/// Execute a storage group subcommand
pub async fn execute(cmd: SgCommands, ctx: &Context) -> ExitCode {
    match cmd {
        SgCommands::Put(args) => put(args, ctx).await,
        SgCommands::Get(args) => {
            let args = head::HeadArgs {
                address: args.address(),
                full_headers: true,
            };
            head::execute(args, ctx).await
        }
        SgCommands::List(args) => {
            let args = search::SearchArgs {
                cid: args.cid,
                root: false,
                sg: true,
                filters: args.filters,
            };
            search::execute(args, ctx).await
        }
        SgCommands::Delete(args) => {
            let args = delete::DeleteArgs {
                address: args.address(),
            };
            delete::execute(args, ctx).await
        }
    }
}

async fn put(args: PutArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let container: ContainerId = match args.cid.parse() {
        Ok(c) => c,
        Err(e) => return super::fail(&formatter, "Invalid container", &e),
    };
    let members = match parse_members(&args.oids) {
        Ok(m) => m,
        Err(e) => return super::fail(&formatter, "Invalid member", &e),
    };
    let (client, _) = match ctx.client().await {
        Ok(c) => c,
        Err(e) => return super::fail(&formatter, "Invalid settings", &e),
    };

    let id = ObjectId::random();
    let token = match token_for(&client, ctx, &formatter, Verb::Put, id).await {
        Ok(t) => t,
        Err(code) => return code,
    };

    let address = match client
        .put_storage_group(&token, id, container, &members, &ctx.cancel)
        .await
    {
        Ok(a) => a,
        Err(e) => return super::fail(&formatter, "Can't store storage group", &e),
    };

    if formatter.is_json() {
        formatter.json(&SgPutOutput {
            container: address.container.to_string(),
            storage_group: address.object.to_string(),
            members: members.iter().map(ToString::to_string).collect(),
        });
    } else {
        formatter.success(&format!(
            "Storage group stored\n  ID: {}\n  CID: {}",
            address.object, address.container
        ));
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    const OID: &str = "6f1b0f5c-3f4e-4d7a-9c1e-0b5a2d3c4e5f";

    #[test]
    fn test_put_requires_members() {
        assert!(Cli::try_parse_from(["ocli", "sg", "put", "--cid", "00"]).is_err());

        let cli =
            Cli::try_parse_from(["ocli", "sg", "put", "--cid", "00", "--oid", OID, "--oid", OID])
                .unwrap();
        let Commands::Sg(SgCommands::Put(args)) = cli.command else {
            panic!("expected sg put");
        };
        assert_eq!(args.oids.len(), 2);
    }

    #[test]
    fn test_group_args_map_to_object_address() {
        let args = GroupArgs {
            cid: "11".repeat(32),
            sgid: OID.into(),
        };
        let address = args.address();
        assert_eq!(address.oid, OID);
        assert!(address.address().is_ok());
    }

    #[test]
    fn test_parse_members() {
        let members = parse_members(&[OID.to_string()]).unwrap();
        assert_eq!(members[0].to_string(), OID);
        assert!(parse_members(&[OID.to_string(), "nope".to_string()]).is_err());
    }

    #[test]
    fn test_put_output_shape() {
        let output = SgPutOutput {
            container: "22".repeat(32),
            storage_group: OID.into(),
            members: vec![OID.into()],
        };
        insta::assert_json_snapshot!(output, @r#"
        {
          "container": "2222222222222222222222222222222222222222222222222222222222222222",
          "storage_group": "6f1b0f5c-3f4e-4d7a-9c1e-0b5a2d3c4e5f",
          "members": [
            "6f1b0f5c-3f4e-4d7a-9c1e-0b5a2d3c4e5f"
          ]
        }
        "#);
    }
}
