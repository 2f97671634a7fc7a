//! Event command - fire and list user events.

use anyhow::Result;
use clap::{Args, Subcommand};
use consulate_client::EventOptions;
use console::{Style, style};

use super::Context;

/// Arguments for the event command.
#[derive(Args, Debug)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommand,
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Fire an event
    Fire {
        /// Event name
        name: String,

        /// Payload
        #[arg(long)]
        payload: Option<String>,

        /// Node name filter (regex)
        #[arg(long)]
        node: Option<String>,

        /// Service name filter (regex)
        #[arg(long)]
        service: Option<String>,

        /// Tag filter (regex, requires --service)
        #[arg(long, requires = "service")]
        tag: Option<String>,
    },

    /// List recent events
    List {
        /// Only events with this name
        #[arg(long)]
        name: Option<String>,
    },
}

/// Run the event command.
pub async fn run(args: EventArgs, ctx: &Context) -> Result<()> {
    let events = ctx.client.events();
    let dim = Style::new().dim();

    match args.command {
        EventCommand::Fire {
            name,
            payload,
            node,
            service,
            tag,
        } => {
            let options = EventOptions {
                node,
                service,
                tag,
                payload: payload.map(String::into_bytes),
            };
            let event = events.fire_with_options(&name, &options).await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&event)?);
            } else {
                let green = Style::new().green();
                println!(
                    "{} fired {} {}",
                    green.apply_to("✓"),
                    event.name,
                    dim.apply_to(&event.id)
                );
            }
        }
        EventCommand::List { name } => {
            let list = events.list(name.as_deref()).await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("{}", dim.apply_to("No events"));
            } else {
                for event in &list {
                    println!(
                        "{} {} {}",
                        dim.apply_to(format!("[{}]", event.ltime)),
                        style(&event.name).bold(),
                        event.payload_str().unwrap_or_default()
                    );
                }
            }
        }
    }

    Ok(())
}
