//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/consulate/config.toml` (user config)
//! 2. `./consulate.toml` (project-local)
//! 3. `CONSUL_HTTP_ADDR`, `CONSUL_HTTP_TOKEN`, `CONSUL_DATACENTER`
//! 4. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, ConsulateConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "consulate.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "consulate";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "CONSULATE_CONFIG_DIR";

const ADDRESS_ENV: &str = "CONSUL_HTTP_ADDR";
const TOKEN_ENV: &str = "CONSUL_HTTP_TOKEN";
const DATACENTER_ENV: &str = "CONSUL_DATACENTER";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: ConsulateConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Primary source file (first successfully loaded), for save operations.
    pub source: Option<ConfigSource>,
    /// Warnings generated during loading (malformed layers, plaintext tokens).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers,
/// then applying the process environment.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `CONSULATE_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut loaded = load_files(project_dir, config_dir)?;
    apply_env_overrides(&mut loaded.config, |name| std::env::var(name).ok());
    Ok(loaded)
}

/// File layers only; no environment.
fn load_files(project_dir: Option<&Path>, config_dir: Option<&Path>) -> Result<LoadedConfig> {
    let mut config = ConsulateConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings)?);
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings)?);

    if config.agent.token.is_some() {
        warnings.push(
            "[agent] contains a plaintext ACL token. \
             Consider using the CONSUL_HTTP_TOKEN environment variable instead."
                .to_string(),
        );
    }

    let source = sources.iter().find(|s| s.loaded).cloned();

    Ok(LoadedConfig {
        config,
        sources,
        source,
        warnings,
    })
}

/// Apply the standard Consul environment variables. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut ConsulateConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(address) = get(ADDRESS_ENV) {
        config.agent.address = Some(address);
    }
    if let Some(token) = get(TOKEN_ENV) {
        config.agent.token = Some(token);
    }
    if let Some(dc) = get(DATACENTER_ENV) {
        config.agent.datacenter = Some(dc);
    }
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<ConsulateConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ConsulateConfig::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &ConsulateConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory: `CONSULATE_CONFIG_DIR`, then the platform
/// default (`~/.config/consulate` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped; a malformed one becomes a warning.
fn load_layer(
    config: &mut ConsulateConfig,
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            })
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_shape() {
        if let Some(p) = config_path() {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded = load_files(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config, ConsulateConfig::new());
    }

    #[test]
    fn test_project_overrides_user() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            r#"
[agent]
address = "10.0.0.1:8500"
datacenter = "dc1"

[watch]
wait_secs = 30
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("consulate.toml"),
            r#"
[agent]
datacenter = "dc2"
"#,
        )
        .unwrap();

        let loaded = load_files(Some(project.path()), Some(user.path())).unwrap();
        let config = &loaded.config;
        assert_eq!(config.agent.address(), "10.0.0.1:8500");
        assert_eq!(config.agent.datacenter.as_deref(), Some("dc2"));
        assert_eq!(config.watch.wait_secs, Some(30));
        assert_eq!(loaded.loaded_from().len(), 2);
        assert!(loaded.source.unwrap().path.ends_with("config.toml"));
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("consulate.toml"), "not valid toml {{{{").unwrap();

        let loaded = load_files(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_plaintext_token_warning() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            project.path().join("consulate.toml"),
            "[agent]\ntoken = \"b1gs33cr3t\"\n",
        )
        .unwrap();

        let loaded = load_files(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.warnings.iter().any(|w| w.contains("plaintext")));
    }

    #[test]
    fn test_env_overrides_files() {
        let mut config = ConsulateConfig::from_toml(
            r#"
[agent]
address = "10.0.0.1:8500"
datacenter = "dc1"
"#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("CONSUL_HTTP_ADDR", "https://consul.internal:8501"),
            ("CONSUL_HTTP_TOKEN", "from-env"),
            ("CONSUL_DATACENTER", ""),
        ]
        .into_iter()
        .collect();

        apply_env_overrides(&mut config, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.agent.address(), "https://consul.internal:8501");
        assert_eq!(config.agent.token.as_deref(), Some("from-env"));
        assert_eq!(config.agent.datacenter.as_deref(), Some("dc1"));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConsulateConfig::new();
        config.watch.retry_budget = Some(7);
        save_config(&config, &path).unwrap();

        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded.watch.retry_budget, Some(7));
    }
}
