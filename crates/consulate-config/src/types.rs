//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [agent]
//! address = "127.0.0.1:8500"
//! datacenter = "dc1"
//! timeout_secs = 30
//!
//! [watch]
//! wait_secs = 60
//! retry_budget = 5
//!
//! [logging]
//! level = "info"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Agent address used when nothing else is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8500";

/// Longest wait the agent accepts for a blocking query.
const MAX_WAIT_SECS: u64 = 600;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All fields are optional so that partial layers (e.g. a project-local file
/// that only sets the datacenter) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulateConfig {
    /// Agent connection settings.
    pub agent: AgentConfig,
    /// Watch loop tuning.
    pub watch: WatchSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl ConsulateConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority,
    /// field by field).
    pub fn merge(&mut self, other: ConsulateConfig) {
        self.agent.merge(other.agent);
        self.watch.merge(other.watch);
        self.logging.merge(other.logging);
    }

    /// Reject values that cannot be turned into a working client.
    pub fn validate(&self) -> Result<()> {
        if let Some(address) = &self.agent.address
            && address.trim().is_empty()
        {
            return Err(invalid("agent.address", "must not be empty"));
        }
        if self.agent.timeout_secs == Some(0) {
            return Err(invalid("agent.timeout_secs", "must be greater than zero"));
        }
        if let Some(wait) = self.watch.wait_secs
            && wait > MAX_WAIT_SECS
        {
            return Err(invalid(
                "watch.wait_secs",
                &format!("agent caps waits at {} seconds", MAX_WAIT_SECS),
            ));
        }
        if self.watch.retry_budget == Some(0) {
            return Err(invalid("watch.retry_budget", "must be at least 1"));
        }
        if self.watch.decode_failure_threshold == Some(0) {
            return Err(invalid("watch.decode_failure_threshold", "must be at least 1"));
        }
        if let (Some(initial), Some(max)) =
            (self.watch.initial_backoff_ms, self.watch.max_backoff_ms)
            && initial > max
        {
            return Err(invalid(
                "watch.initial_backoff_ms",
                "must not exceed watch.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn merge_opt<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// `[agent]` section: how to reach the Consul agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// `host:port` or a full URL.
    pub address: Option<String>,
    /// ACL token. Prefer `CONSUL_HTTP_TOKEN` over storing it here.
    pub token: Option<String>,
    /// Datacenter every request targets.
    pub datacenter: Option<String>,
    /// Timeout for non-blocking requests.
    pub timeout_secs: Option<u64>,
}

impl AgentConfig {
    fn merge(&mut self, other: AgentConfig) {
        merge_opt(&mut self.address, other.address);
        merge_opt(&mut self.token, other.token);
        merge_opt(&mut self.datacenter, other.datacenter);
        merge_opt(&mut self.timeout_secs, other.timeout_secs);
    }

    /// Configured address, or the local agent.
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(DEFAULT_ADDRESS)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch
// ─────────────────────────────────────────────────────────────────────────────

/// `[watch]` section. Unset fields keep the client library's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Wait requested on each blocking query.
    pub wait_secs: Option<u64>,
    /// Margin past the wait before a query is abandoned.
    pub grace_secs: Option<u64>,
    /// Consecutive failures tolerated before a watch stops.
    pub retry_budget: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    /// Consecutive undecodable responses tolerated.
    pub decode_failure_threshold: Option<u32>,
    /// Delay between polls of endpoints that report no index.
    pub poll_interval_secs: Option<u64>,
}

impl WatchSettings {
    fn merge(&mut self, other: WatchSettings) {
        merge_opt(&mut self.wait_secs, other.wait_secs);
        merge_opt(&mut self.grace_secs, other.grace_secs);
        merge_opt(&mut self.retry_budget, other.retry_budget);
        merge_opt(&mut self.initial_backoff_ms, other.initial_backoff_ms);
        merge_opt(&mut self.max_backoff_ms, other.max_backoff_ms);
        merge_opt(
            &mut self.decode_failure_threshold,
            other.decode_failure_threshold,
        );
        merge_opt(&mut self.poll_interval_secs, other.poll_interval_secs);
    }

    pub fn wait(&self) -> Option<Duration> {
        self.wait_secs.map(Duration::from_secs)
    }

    pub fn grace(&self) -> Option<Duration> {
        self.grace_secs.map(Duration::from_secs)
    }

    pub fn initial_backoff(&self) -> Option<Duration> {
        self.initial_backoff_ms.map(Duration::from_millis)
    }

    pub fn max_backoff(&self) -> Option<Duration> {
        self.max_backoff_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive for the console (e.g. `info`, `consulate_client=debug`).
    pub level: Option<String>,
    /// Directory for the rotating JSON log file. Defaults to `<config dir>/logs`.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn merge(&mut self, other: LoggingConfig) {
        merge_opt(&mut self.level, other.level);
        merge_opt(&mut self.file, other.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = ConsulateConfig::new();
        assert!(config.agent.address.is_none());
        assert_eq!(config.agent.address(), DEFAULT_ADDRESS);
        assert!(config.watch.wait().is_none());
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
[agent]
address = "consul.service:8500"
datacenter = "dc2"
timeout_secs = 15

[watch]
wait_secs = 120
retry_budget = 8
initial_backoff_ms = 100
max_backoff_ms = 5000

[logging]
level = "debug"
"#;
        let config = ConsulateConfig::from_toml(toml).unwrap();
        assert_eq!(config.agent.address(), "consul.service:8500");
        assert_eq!(config.agent.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.watch.wait(), Some(Duration::from_secs(120)));
        assert_eq!(config.watch.retry_budget, Some(8));
        assert_eq!(config.watch.max_backoff(), Some(Duration::from_secs(5)));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_merge_is_field_level() {
        let mut base = ConsulateConfig::from_toml(
            r#"
[agent]
address = "10.0.0.1:8500"
datacenter = "dc1"
"#,
        )
        .unwrap();
        let overlay = ConsulateConfig::from_toml(
            r#"
[agent]
datacenter = "dc2"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.agent.address(), "10.0.0.1:8500");
        assert_eq!(base.agent.datacenter.as_deref(), Some("dc2"));
    }

    #[test]
    fn test_rejects_wait_above_agent_cap() {
        let err = ConsulateConfig::from_toml("[watch]\nwait_secs = 900\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "watch.wait_secs"));
    }

    #[test]
    fn test_rejects_zero_retry_budget() {
        assert!(ConsulateConfig::from_toml("[watch]\nretry_budget = 0\n").is_err());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let toml = "[watch]\ninitial_backoff_ms = 5000\nmax_backoff_ms = 100\n";
        assert!(ConsulateConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_skips_unset_fields() {
        let mut config = ConsulateConfig::new();
        config.agent.address = Some("10.0.0.1:8500".to_string());
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("address"));
        assert!(!toml.contains("token"));
        assert_eq!(ConsulateConfig::from_toml(&toml).unwrap(), config);
    }
}
