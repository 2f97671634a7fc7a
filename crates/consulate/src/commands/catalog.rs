//! Catalog command - node and service queries.

use anyhow::Result;
use clap::{Args, Subcommand};
use consulate_client::{NodeQueryOptions, ServiceQueryOptions};
use console::{Style, style};

use super::Context;

/// Arguments for the catalog command.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// List nodes
    Nodes {
        /// Sort by round-trip time from this node (`_agent` for the local agent)
        #[arg(long)]
        near: Option<String>,
    },

    /// List services and their tags
    Services,

    /// List the instances of a service
    Service {
        /// Service name
        name: String,

        /// Only instances with this tag
        #[arg(long)]
        tag: Option<String>,

        /// Sort by round-trip time from this node
        #[arg(long)]
        near: Option<String>,
    },

    /// List known datacenters
    Datacenters,
}

/// Run the catalog command.
pub async fn run(args: CatalogArgs, ctx: &Context) -> Result<()> {
    let catalog = ctx.client.catalog();
    let dim = Style::new().dim();

    match args.command {
        CatalogCommand::Nodes { near } => {
            let options = NodeQueryOptions {
                near,
                ..Default::default()
            };
            let nodes = catalog.nodes_with_options(&options).await?.payload;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in &nodes {
                    println!("{:<30} {}", style(&node.node).bold(), node.address);
                }
            }
        }
        CatalogCommand::Services => {
            let services = catalog.services().await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&services)?);
            } else {
                for (name, tags) in &services {
                    if tags.is_empty() {
                        println!("{}", style(name).bold());
                    } else {
                        println!(
                            "{} {}",
                            style(name).bold(),
                            dim.apply_to(format!("[{}]", tags.join(", ")))
                        );
                    }
                }
            }
        }
        CatalogCommand::Service { name, tag, near } => {
            let options = ServiceQueryOptions {
                tag,
                near,
                ..Default::default()
            };
            let instances = catalog
                .service_nodes_with_options(&name, &options)
                .await?
                .payload;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&instances)?);
            } else if instances.is_empty() {
                println!("{}", dim.apply_to(format!("No instances of '{}'", name)));
            } else {
                for instance in &instances {
                    println!(
                        "{:<30} {}:{} {}",
                        style(&instance.service_id).bold(),
                        instance.effective_address(),
                        instance.service_port,
                        dim.apply_to(&instance.node)
                    );
                }
            }
        }
        CatalogCommand::Datacenters => {
            let dcs = catalog.datacenters().await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&dcs)?);
            } else {
                for dc in dcs {
                    println!("{}", dc);
                }
            }
        }
    }

    Ok(())
}
