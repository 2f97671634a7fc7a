//! consulate - command-line client for the Consul agent API.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{catalog, config, event, kv, session, status, watch};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// consulate - Consul agent client with blocking-query watches
#[derive(Parser)]
#[command(name = "consulate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Agent address (default: 127.0.0.1:8500)
    #[arg(long, global = true, env = "CONSUL_HTTP_ADDR")]
    pub address: Option<String>,

    /// ACL token
    #[arg(long, global = true, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Datacenter to query (default: the agent's own)
    #[arg(long, global = true)]
    pub datacenter: Option<String>,

    /// Directory holding config.toml (default: platform config dir)
    #[arg(long, global = true, env = "CONSULATE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Key/value store operations
    Kv(kv::KvArgs),

    /// Catalog queries
    Catalog(catalog::CatalogArgs),

    /// Session management
    Session(session::SessionArgs),

    /// User events
    Event(event::EventArgs),

    /// Show cluster leader and peers
    Status(status::StatusArgs),

    /// Watch a resource and print every change
    Watch(watch::WatchArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(consulate_config::config_dir);
    let mut loaded = consulate_config::load_config_with_options(None, config_dir.as_deref())?;

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "consulate=debug,consulate_client=debug,consulate_config=debug,info".to_string()
    } else {
        loaded
            .config
            .logging
            .level
            .clone()
            .unwrap_or_else(|| "consulate=info,consulate_client=info,warn".to_string())
    };

    let log_dir = loaded
        .config
        .logging
        .file
        .clone()
        .or_else(|| config_dir.as_ref().map(|d| d.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "consulate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "consulate=trace,consulate_client=trace,consulate_config=trace,info",
                )),
        )
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    // CLI flags override every config layer
    let agent = &mut loaded.config.agent;
    if cli.address.is_some() {
        agent.address = cli.address;
    }
    if cli.token.is_some() {
        agent.token = cli.token;
    }
    if cli.datacenter.is_some() {
        agent.datacenter = cli.datacenter;
    }

    let ctx = commands::Context {
        client: commands::build_client(&loaded.config)?,
        loaded,
        config_dir,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Kv(args) => kv::run(args, &ctx).await,
        Commands::Catalog(args) => catalog::run(args, &ctx).await,
        Commands::Session(args) => session::run(args, &ctx).await,
        Commands::Event(args) => event::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Watch(args) => watch::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
