//! KV command - key/value store operations.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use consulate_client::KvPutOptions;
use console::{Style, style};

use super::Context;

/// Arguments for the kv command.
#[derive(Args, Debug)]
pub struct KvArgs {
    #[command(subcommand)]
    pub command: KvCommand,
}

#[derive(Subcommand, Debug)]
pub enum KvCommand {
    /// Read a key
    Get {
        /// Key path
        key: String,

        /// Print only the value
        #[arg(long)]
        raw: bool,
    },

    /// Write a key
    Put {
        /// Key path
        key: String,

        /// Value to store
        value: String,

        /// Only write if the key's modify index matches (0: only if absent)
        #[arg(long)]
        cas: Option<u64>,

        /// Opaque flags stored with the key
        #[arg(long)]
        flags: Option<u64>,
    },

    /// Delete a key
    Delete {
        /// Key path
        key: String,

        /// Delete every key under the prefix
        #[arg(short, long)]
        recurse: bool,
    },

    /// List entries under a prefix
    List {
        /// Key prefix
        #[arg(default_value = "")]
        prefix: String,

        /// Print key names only
        #[arg(long)]
        keys: bool,
    },
}

/// Run the kv command.
pub async fn run(args: KvArgs, ctx: &Context) -> Result<()> {
    let kv = ctx.client.kv();
    let dim = Style::new().dim();
    let green = Style::new().green();

    match args.command {
        KvCommand::Get { key, raw } => {
            let Some(entry) = kv.get(&key).await? else {
                bail!("key '{}' not found", key);
            };
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else if raw {
                println!("{}", entry.value_str().unwrap_or_default());
            } else {
                println!("{}", style(&entry.key).bold());
                println!(
                    "  {} {}",
                    dim.apply_to("Value:"),
                    entry.value_str().unwrap_or("<binary or null>")
                );
                println!("  {} {}", dim.apply_to("Flags:"), entry.flags);
                println!("  {} {}", dim.apply_to("ModifyIndex:"), entry.modify_index);
                if let Some(session) = &entry.session {
                    println!("  {} {}", dim.apply_to("Locked by:"), session);
                }
            }
        }
        KvCommand::Put {
            key,
            value,
            cas,
            flags,
        } => {
            let options = KvPutOptions {
                cas,
                flags,
                ..Default::default()
            };
            let applied = kv.put_with_options(&key, value, &options).await?;
            if ctx.json_output {
                println!("{}", serde_json::json!({ "key": key, "applied": applied }));
            } else if applied {
                println!("{} {}", green.apply_to("✓"), key);
            } else {
                bail!("write to '{}' rejected (check-and-set index mismatch)", key);
            }
        }
        KvCommand::Delete { key, recurse } => {
            if recurse {
                kv.delete_tree(&key).await?;
            } else {
                kv.delete(&key).await?;
            }
            if !ctx.json_output {
                println!("{} deleted {}", green.apply_to("✓"), key);
            }
        }
        KvCommand::List { prefix, keys } => {
            if keys {
                let names = kv.keys(&prefix).await?;
                if ctx.json_output {
                    println!("{}", serde_json::to_string_pretty(&names)?);
                } else {
                    for name in names {
                        println!("{}", name);
                    }
                }
            } else {
                let entries = kv.list(&prefix).await?;
                if ctx.json_output {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else if entries.is_empty() {
                    println!("{}", dim.apply_to("No keys found"));
                } else {
                    for entry in &entries {
                        println!(
                            "{} {}",
                            style(&entry.key).bold(),
                            truncate(entry.value_str().unwrap_or_default(), 60)
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
