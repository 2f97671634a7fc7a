//! Configuration for the consulate Consul client.
//!
//! Provides TOML-based configuration with:
//! - Agent connection settings (`[agent]`: address, token, datacenter)
//! - Watch loop tuning (`[watch]`: wait, retry budget, backoff)
//! - Logging settings (`[logging]`)
//! - Config file layering (user config dir + project-local overrides)
//! - The standard `CONSUL_HTTP_*` environment variables on top

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    apply_env_overrides, config_dir, config_path, load_config, load_config_file,
    load_config_with_options, save_config, ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;
