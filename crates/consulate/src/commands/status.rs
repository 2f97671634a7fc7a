//! Status command - shows the cluster leader and peers.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    reachable: bool,
    address: String,
    leader: Option<String>,
    peers: Vec<String>,
    error: Option<String>,
}

/// Run the status command.
pub async fn run(_args: StatusArgs, ctx: &Context) -> Result<()> {
    let status = ctx.client.status();
    let address = ctx.client.base_url().to_string();

    let result = async {
        let leader = status.leader().await?;
        let peers = status.peers().await?;
        Ok::<_, consulate_client::Error>((leader, peers))
    }
    .await;

    let output = match result {
        Ok((leader, peers)) => StatusOutput {
            reachable: true,
            address,
            leader: Some(leader).filter(|l| !l.is_empty()),
            peers,
            error: None,
        },
        Err(e) => StatusOutput {
            reachable: false,
            address,
            leader: None,
            peers: Vec::new(),
            error: Some(e.to_string()),
        },
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Consul Cluster Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Agent:"), output.address);

    if !output.reachable {
        let red = Style::new().red();
        println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● unreachable"));
        if ctx.verbose
            && let Some(error) = &output.error
        {
            println!("  {} {}", dim.apply_to("Error:"), error);
        }
        println!();
        return Ok(());
    }

    match &output.leader {
        Some(leader) => {
            let green = Style::new().green();
            println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● leader elected"));
            println!("  {} {}", dim.apply_to("Leader:"), leader);
        }
        None => {
            let yellow = Style::new().yellow();
            println!("  {} {}", dim.apply_to("Status:"), yellow.apply_to("● no leader"));
        }
    }
    println!("  {} {}", dim.apply_to("Peers:"), output.peers.len());
    if ctx.verbose {
        for peer in &output.peers {
            println!("    {}", peer);
        }
    }
    println!();

    Ok(())
}
