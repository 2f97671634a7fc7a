//! Config command - configuration management.

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};

use consulate_config::ConsulateConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./consulate.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(ctx, local),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.clone();
    if config.agent.token.is_some() {
        config.agent.token = Some("<redacted>".to_string());
    }

    if ctx.json_output {
        let output = serde_json::json!({
            "agent": {
                "address": config.agent.address(),
                "datacenter": config.agent.datacenter,
                "token": config.agent.token,
                "timeout_secs": config.agent.timeout_secs,
            },
            "sources": ctx.loaded.loaded_from(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# consulate configuration\n");
    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        for source in sources {
            println!("# loaded: {}", source.display());
        }
        println!();
    }
    println!("# agent address: {}\n", config.agent.address());
    print!("{}", config.to_toml()?);

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }
    println!("  + CONSUL_HTTP_ADDR, CONSUL_HTTP_TOKEN, CONSUL_DATACENTER");
    println!("  + command-line flags");

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'consulate config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_init(ctx: &Context, local: bool) -> Result<()> {
    let path = if local {
        std::path::PathBuf::from("consulate.toml")
    } else {
        user_config_path(ctx)?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    let mut config = ConsulateConfig::new();
    config.agent.address = Some(consulate_config::DEFAULT_ADDRESS.to_string());
    config.agent.timeout_secs = Some(30);
    config.watch.wait_secs = Some(60);
    config.watch.retry_budget = Some(5);
    config.logging.level = Some("info".to_string());

    consulate_config::save_config(&config, &path)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  export CONSUL_HTTP_TOKEN=...   # keep the ACL token out of the file");
    println!("  consulate config show          # verify configuration");

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    println!("{}", user_config_path(ctx)?.display());
    Ok(())
}

fn user_config_path(ctx: &Context) -> Result<std::path::PathBuf> {
    ctx.config_dir
        .as_ref()
        .map(|d| d.join("config.toml"))
        .ok_or_else(|| anyhow!("Could not determine config directory"))
}
