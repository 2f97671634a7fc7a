//! Session command - session management.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use consulate_client::{SessionBehavior, SessionOptions};
use console::{Style, style};

use super::Context;

/// Arguments for the session command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// List sessions
    List {
        /// Only sessions belonging to this node
        #[arg(long)]
        node: Option<String>,
    },

    /// Create a session
    Create {
        /// Human-readable name
        #[arg(long)]
        name: Option<String>,

        /// TTL (e.g. `30s`); the session expires unless renewed
        #[arg(long)]
        ttl: Option<String>,

        /// What happens to held locks when the session ends
        #[arg(long, value_enum)]
        behavior: Option<Behavior>,
    },

    /// Destroy a session
    Destroy {
        /// Session ID
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Behavior {
    Release,
    Delete,
}

impl From<Behavior> for SessionBehavior {
    fn from(b: Behavior) -> Self {
        match b {
            Behavior::Release => SessionBehavior::Release,
            Behavior::Delete => SessionBehavior::Delete,
        }
    }
}

/// Run the session command.
pub async fn run(args: SessionArgs, ctx: &Context) -> Result<()> {
    let sessions = ctx.client.sessions();
    let dim = Style::new().dim();

    match args.command {
        SessionCommand::List { node } => {
            let list = match node {
                Some(node) => sessions.list_node(&node).await?,
                None => sessions.list().await?,
            };
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("{}", dim.apply_to("No sessions"));
            } else {
                for session in &list {
                    println!(
                        "{} {} {}",
                        style(&session.id).bold(),
                        session.node,
                        dim.apply_to(&session.name)
                    );
                }
            }
        }
        SessionCommand::Create {
            name,
            ttl,
            behavior,
        } => {
            let options = SessionOptions {
                name,
                ttl,
                behavior: behavior.map(Into::into),
                ..Default::default()
            };
            let id = sessions.create_with_options(&options).await?;
            if ctx.json_output {
                println!("{}", serde_json::json!({ "id": id }));
            } else {
                println!("{}", id);
            }
        }
        SessionCommand::Destroy { id } => {
            sessions.destroy(&id).await?;
            if !ctx.json_output {
                let green = Style::new().green();
                println!("{} destroyed {}", green.apply_to("✓"), id);
            }
        }
    }

    Ok(())
}
