//! Watch command - follows a resource with blocking queries and prints
//! every content change until interrupted.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use consulate_client::{
    BlockingQueryOptions, CheckStatus, NodeQueryOptions, QueryResult, ServiceQueryOptions,
    WatcherHandle,
};
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the watch command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Start from this index instead of reading the current state first
    #[arg(long, global = true, default_value_t = 0)]
    pub index: u64,

    /// Exit after this many updates
    #[arg(long, global = true)]
    pub count: Option<usize>,

    #[command(subcommand)]
    pub command: WatchCommand,
}

#[derive(Subcommand, Debug)]
pub enum WatchCommand {
    /// Watch a single key
    Key {
        /// Key path
        key: String,
    },

    /// Watch every key under a prefix
    Prefix {
        /// Key prefix
        prefix: String,
    },

    /// Watch the service list
    Services,

    /// Watch the healthy instances of a service
    Service {
        /// Service name
        name: String,

        /// Only instances with this tag
        #[arg(long)]
        tag: Option<String>,

        /// Include instances with failing checks
        #[arg(long)]
        all: bool,
    },

    /// Watch the node list
    Nodes,

    /// Watch all sessions
    Sessions,

    /// Watch user events
    Events {
        /// Only events with this name
        #[arg(long)]
        name: Option<String>,
    },

    /// Watch health checks in a state
    Checks {
        #[arg(value_enum, default_value = "any")]
        state: State,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum State {
    Any,
    Passing,
    Warning,
    Critical,
}

impl From<State> for CheckStatus {
    fn from(s: State) -> Self {
        match s {
            State::Any => CheckStatus::Any,
            State::Passing => CheckStatus::Passing,
            State::Warning => CheckStatus::Warning,
            State::Critical => CheckStatus::Critical,
        }
    }
}

/// Run the watch command.
pub async fn run(args: WatchArgs, ctx: &Context) -> Result<()> {
    let client = &ctx.client;
    let initial = BlockingQueryOptions::new().with_index(args.index);
    let count = args.count;

    match args.command {
        WatchCommand::Key { key } => {
            let watcher = client.kv().watch_key(&key, initial);
            follow(watcher, ctx, count, |entry| match entry {
                Some(kv) => println!("{}", kv.value_str().unwrap_or("<binary or null>")),
                None => println!("{}", Style::new().dim().apply_to("<absent>")),
            })
            .await
        }
        WatchCommand::Prefix { prefix } => {
            let watcher = client.kv().watch_prefix(&prefix, initial);
            follow(watcher, ctx, count, |entries| {
                for kv in entries {
                    println!("  {} {}", style(&kv.key).bold(), kv.value_str().unwrap_or(""));
                }
            })
            .await
        }
        WatchCommand::Services => {
            let watcher = client.catalog().watch_services(initial);
            follow(watcher, ctx, count, |services| {
                for (name, tags) in services {
                    println!("  {} {}", style(name).bold(), tags.join(","));
                }
            })
            .await
        }
        WatchCommand::Service { name, tag, all } => {
            let options = ServiceQueryOptions {
                tag,
                near: None,
                blocking: initial,
            };
            let watcher = client.health().watch_service(&name, !all, options);
            follow(watcher, ctx, count, |entries| {
                for entry in entries {
                    println!(
                        "  {} {}:{} {}",
                        style(&entry.service.id).bold(),
                        entry.node.address,
                        entry.service.port,
                        entry.aggregate_status()
                    );
                }
            })
            .await
        }
        WatchCommand::Nodes => {
            let options = NodeQueryOptions {
                near: None,
                blocking: initial,
            };
            let watcher = client.catalog().watch_nodes(options);
            follow(watcher, ctx, count, |nodes| {
                for node in nodes {
                    println!("  {} {}", style(&node.node).bold(), node.address);
                }
            })
            .await
        }
        WatchCommand::Sessions => {
            let watcher = client.sessions().watch(initial);
            follow(watcher, ctx, count, |sessions| {
                for session in sessions {
                    println!("  {} {}", style(&session.id).bold(), session.node);
                }
            })
            .await
        }
        WatchCommand::Events { name } => {
            let watcher = client.events().watch(name.as_deref(), initial);
            follow(watcher, ctx, count, |events| {
                if let Some(latest) = events.last() {
                    println!(
                        "  {} {}",
                        style(&latest.name).bold(),
                        latest.payload_str().unwrap_or("")
                    );
                }
            })
            .await
        }
        WatchCommand::Checks { state } => {
            let watcher = client.health().watch_checks(state.into(), initial);
            follow(watcher, ctx, count, |checks| {
                for check in checks {
                    println!(
                        "  {} {} {}",
                        style(&check.check_id).bold(),
                        check.status,
                        check.node
                    );
                }
            })
            .await
        }
    }
}

/// Print updates until Ctrl-C, the update limit, or a terminal watch error.
async fn follow<T, F>(
    watcher: WatcherHandle<T>,
    ctx: &Context,
    limit: Option<usize>,
    render: F,
) -> Result<()>
where
    T: Serialize + Clone + Send + Sync + 'static,
    F: Fn(&T),
{
    let mut updates = watcher.updates()?;
    watcher.start()?;
    tracing::debug!(resource = %watcher.resource(), "Watching");

    let dim = Style::new().dim();
    let mut seen = 0usize;
    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => update,
        };
        let Some(update) = update else { break };

        print_update(&update, ctx, &dim, &render);
        seen += 1;
        if limit.is_some_and(|n| seen >= n) {
            break;
        }
    }

    watcher.shutdown().await;
    match watcher.error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn print_update<T, F>(update: &QueryResult<T>, ctx: &Context, dim: &Style, render: &F)
where
    T: Serialize,
    F: Fn(&T),
{
    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "index": update.index.value(), "payload": &update.payload })
        );
    } else {
        println!("{}", dim.apply_to(format!("── index {}", update.index)));
        render(&update.payload);
    }
}
