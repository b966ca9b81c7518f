//! Configuration loader.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Config file, when set and present
//! 3. Environment variables (`APPID_*`)
//!
//! Each layer overrides the previous.

use super::{ConfigError, IdentityConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides [`IdentityConfig::store_root_path`].
pub const ENV_STORE_ROOT: &str = "APPID_STORE_ROOT";

/// Overrides [`IdentityConfig::heartbeat_ms`].
pub const ENV_HEARTBEAT_MS: &str = "APPID_HEARTBEAT_MS";

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```ignore
/// use appid_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_file("/etc/appid/identity.toml")
///     .skip_env_vars()  // For testing
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Config file path.
    file: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the config file. A missing file is ignored.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if an environment variable holds an invalid value.
    pub fn load(&self) -> Result<IdentityConfig, ConfigError> {
        let mut config = match &self.file {
            Some(path) => load_file(path)?.unwrap_or_default(),
            None => IdentityConfig::default(),
        };

        if !self.skip_env {
            apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        }

        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<Option<IdentityConfig>, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config =
        IdentityConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(Some(config))
}

fn apply_overrides(
    config: &mut IdentityConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(val) = lookup(ENV_STORE_ROOT) {
        config.store_root_path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup(ENV_HEARTBEAT_MS) {
        config.heartbeat_ms = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var(ENV_HEARTBEAT_MS, "expected integer"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("identity.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new().skip_env_vars().load().unwrap();
        assert_eq!(config, IdentityConfig::default());
    }

    #[test]
    fn load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = create_config_file(
            temp.path(),
            r#"
heartbeat_ms = 250
domain_name = "Acme"
party_name = "Hub"
"#,
        );

        let config = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.heartbeat_ms, 250);
        assert_eq!(config.root.domain_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn missing_file_ok() {
        let config = ConfigLoader::new()
            .with_file("/nonexistent/path/identity.toml")
            .skip_env_vars()
            .load()
            .unwrap();
        assert_eq!(config, IdentityConfig::default());
    }

    #[test]
    fn malformed_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = create_config_file(temp.path(), "heartbeat_ms = \"fast\"");

        let err = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { path: ref p, .. } if p == &path));
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [(ENV_STORE_ROOT, "/srv/appid"), (ENV_HEARTBEAT_MS, " 40 ")]
            .into_iter()
            .collect();
        let mut config = IdentityConfig::default();
        apply_overrides(&mut config, |name| vars.get(name).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.store_root_path, Some(PathBuf::from("/srv/appid")));
        assert_eq!(config.heartbeat_ms, 40);
    }

    #[test]
    fn env_invalid_heartbeat() {
        let mut config = IdentityConfig::default();
        let err = apply_overrides(&mut config, |name| {
            (name == ENV_HEARTBEAT_MS).then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref name, .. } if name == ENV_HEARTBEAT_MS));
    }
}
