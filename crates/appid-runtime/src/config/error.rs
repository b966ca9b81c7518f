//! Configuration errors.
//!
//! # Error Codes
//!
//! | Variant | Code |
//! |---------|------|
//! | [`ConfigError::ReadFile`] | `CONFIG_READ_FILE` |
//! | [`ConfigError::ParseToml`] | `CONFIG_PARSE_TOML` |
//! | [`ConfigError::InvalidEnvVar`] | `CONFIG_INVALID_ENV_VAR` |
//! | [`ConfigError::InvalidName`] | `CONFIG_INVALID_NAME` |
//! | [`ConfigError::NameConflict`] | `CONFIG_NAME_CONFLICT` |
//! | [`ConfigError::ExternalRoot`] | `CONFIG_EXTERNAL_ROOT` |
//! | [`ConfigError::DuplicateParty`] | `CONFIG_DUPLICATE_PARTY` |
//! | [`ConfigError::FeatureOverlap`] | `CONFIG_FEATURE_OVERLAP` |
//! | [`ConfigError::InvalidHeartbeat`] | `CONFIG_INVALID_HEARTBEAT` |
//! | [`ConfigError::InvalidStoreRoot`] | `CONFIG_INVALID_STORE_ROOT` |
//!
//! None is recoverable: the configuration must be fixed.

use appid_types::{ErrorCode, NameError};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML, from a file or an inline string.
    #[error("failed to parse configuration '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Invalid environment variable value.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    /// A name of the section is malformed.
    #[error("invalid name in '{section}': {source}")]
    InvalidName {
        section: String,
        #[source]
        source: NameError,
    },

    /// Name fields contradict each other or a required name is missing.
    #[error("'{section}': {message}")]
    NameConflict { section: String, message: String },

    /// The root cannot belong to the `External` domain.
    #[error("root domain cannot be 'External': this name denotes an external system")]
    ExternalRoot,

    /// Two sections resolve to the same full name.
    #[error("duplicate party definition '{section}': '{full_name}' is already defined by '{existing}'")]
    DuplicateParty {
        full_name: String,
        section: String,
        existing: String,
    },

    /// The same feature is both allowed and disallowed by one section.
    #[error("'{section}': features {} are both allowed and disallowed", features.join(", "))]
    FeatureOverlap {
        section: String,
        features: Vec<String>,
    },

    /// Heartbeat outside of `0` or `20..=1000` ms.
    #[error("heartbeat_ms must be 0 or between 20 and 1000, got {0}")]
    InvalidHeartbeat(u64),

    /// The store root must be an absolute path.
    #[error("invalid store root path '{path}': {message}")]
    InvalidStoreRoot { path: PathBuf, message: String },
}

impl ConfigError {
    /// Creates a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse TOML error.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid env var error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(section: impl Into<String>, source: NameError) -> Self {
        Self::InvalidName {
            section: section.into(),
            source,
        }
    }

    /// Creates a name conflict error.
    pub fn name_conflict(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NameConflict {
            section: section.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "CONFIG_READ_FILE",
            Self::ParseToml { .. } => "CONFIG_PARSE_TOML",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
            Self::InvalidName { .. } => "CONFIG_INVALID_NAME",
            Self::NameConflict { .. } => "CONFIG_NAME_CONFLICT",
            Self::ExternalRoot => "CONFIG_EXTERNAL_ROOT",
            Self::DuplicateParty { .. } => "CONFIG_DUPLICATE_PARTY",
            Self::FeatureOverlap { .. } => "CONFIG_FEATURE_OVERLAP",
            Self::InvalidHeartbeat(_) => "CONFIG_INVALID_HEARTBEAT",
            Self::InvalidStoreRoot { .. } => "CONFIG_INVALID_STORE_ROOT",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
