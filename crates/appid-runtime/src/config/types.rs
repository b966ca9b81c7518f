//! Root configuration type.

use super::{resolve_root, ConfigError, PartySection, ResolvedRoot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default heartbeat period in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 1000;

/// Smallest non-zero heartbeat period in milliseconds.
pub const MIN_HEARTBEAT_MS: u64 = 20;

/// Largest heartbeat period in milliseconds.
pub const MAX_HEARTBEAT_MS: u64 = 1000;

/// Directory name below the platform data directory.
pub const STORE_DIR_NAME: &str = "appid";

/// Configuration of one identity root.
///
/// The root party section is flattened into the top level:
///
/// ```toml
/// heartbeat_ms = 500
/// full_name = "Acme/$Hub/#Prod"
///
/// [[parties]]
/// party_name = "Billing"
/// address = "https://billing.acme.example"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Root of every party store. Defaults to `<data_local_dir>/appid`.
    pub store_root_path: Option<PathBuf>,

    /// Agent heartbeat period; `0` disables it.
    pub heartbeat_ms: u64,

    /// The root party and its static parties.
    #[serde(flatten)]
    pub root: PartySection,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            store_root_path: None,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            root: PartySection::default(),
        }
    }
}

impl IdentityConfig {
    /// Wraps a root section with default settings.
    #[must_use]
    pub fn with_root(root: PartySection) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Sets the store root.
    #[must_use]
    pub fn with_store_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_root_path = Some(path.into());
        self
    }

    /// Sets the heartbeat period.
    #[must_use]
    pub fn with_heartbeat_ms(mut self, heartbeat_ms: u64) -> Self {
        self.heartbeat_ms = heartbeat_ms;
        self
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the `toml` error as is; callers attach the origin.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Heartbeat period, `None` when disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeartbeat`] outside `0` or `20..=1000`.
    pub fn heartbeat_period(&self) -> Result<Option<Duration>, ConfigError> {
        match self.heartbeat_ms {
            0 => Ok(None),
            ms @ MIN_HEARTBEAT_MS..=MAX_HEARTBEAT_MS => Ok(Some(Duration::from_millis(ms))),
            ms => Err(ConfigError::InvalidHeartbeat(ms)),
        }
    }

    /// Effective store root.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStoreRoot`] for relative paths or when
    /// the platform has no data directory.
    pub fn store_root(&self) -> Result<PathBuf, ConfigError> {
        let path = match &self.store_root_path {
            Some(path) => path.clone(),
            None => default_store_root().ok_or_else(|| ConfigError::InvalidStoreRoot {
                path: PathBuf::new(),
                message: "no platform data directory".into(),
            })?,
        };
        check_absolute(&path)?;
        Ok(path)
    }

    /// Validates the settings and resolves the party tree.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] met.
    pub fn resolve(&self) -> Result<ResolvedRoot, ConfigError> {
        self.heartbeat_period()?;
        resolve_root(&self.root)
    }
}

/// `<data_local_dir>/appid`, if the platform has a data directory.
#[must_use]
pub fn default_store_root() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(STORE_DIR_NAME))
}

fn check_absolute(path: &Path) -> Result<(), ConfigError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::InvalidStoreRoot {
            path: path.to_path_buf(),
            message: "path must be absolute".into(),
        })
    }
}
