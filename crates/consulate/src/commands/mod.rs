//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use consulate_client::{ConsulClient, WatchConfig};
use consulate_config::{ConsulateConfig, LoadedConfig};

pub mod catalog;
pub mod config;
pub mod event;
pub mod kv;
pub mod session;
pub mod status;
pub mod watch;

/// Shared context for all commands.
pub struct Context {
    /// Client for the configured agent.
    pub client: ConsulClient,
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// User config directory in effect.
    pub config_dir: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Build a client from the merged configuration.
pub fn build_client(config: &ConsulateConfig) -> Result<ConsulClient> {
    let mut builder = ConsulClient::builder()
        .address(config.agent.address())
        .watch_config(watch_config(config));

    if let Some(token) = &config.agent.token {
        builder = builder.token(token);
    }
    if let Some(dc) = &config.agent.datacenter {
        builder = builder.datacenter(dc);
    }
    if let Some(timeout) = config.agent.timeout() {
        builder = builder.timeout(timeout);
    }
    if let Some(grace) = config.watch.grace() {
        builder = builder.grace(grace);
    }

    builder
        .build()
        .with_context(|| format!("invalid agent address '{}'", config.agent.address()))
}

/// Watch tuning from `[watch]`; unset fields keep the library defaults.
fn watch_config(config: &ConsulateConfig) -> WatchConfig {
    let settings = &config.watch;
    let mut watch = WatchConfig::default();

    if let Some(wait) = settings.wait() {
        watch = watch.with_wait(wait);
    }
    if let Some(budget) = settings.retry_budget {
        watch = watch.with_retry_budget(budget);
    }
    let initial = settings.initial_backoff().unwrap_or(watch.initial_backoff);
    let max = settings.max_backoff().unwrap_or(watch.max_backoff);
    watch = watch.with_backoff(initial, max);
    if let Some(threshold) = settings.decode_failure_threshold {
        watch = watch.with_decode_failure_threshold(threshold);
    }
    if let Some(interval) = settings.poll_interval() {
        watch = watch.with_poll_interval(interval);
    }
    watch
}
