//! Identity service errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`IdentityError::Config`] | `IDENTITY_CONFIG` | No |
//! | [`IdentityError::InvalidIncrement`] | `IDENTITY_INVALID_INCREMENT` | No |
//! | [`IdentityError::NameCollision`] | `IDENTITY_NAME_COLLISION` | Yes |
//! | [`IdentityError::OwnerDestroyed`] | `IDENTITY_OWNER_DESTROYED` | No |
//! | [`IdentityError::SetupFailed`] | `IDENTITY_SETUP_FAILED` | Yes |
//! | [`IdentityError::NotDynamic`] | `IDENTITY_NOT_DYNAMIC` | No |
//! | [`IdentityError::NotRunning`] | `IDENTITY_NOT_RUNNING` | No |
//! | [`IdentityError::StartRefused`] | `IDENTITY_START_REFUSED` | No |
//! | [`IdentityError::InitializationFailed`] | `IDENTITY_INITIALIZATION_FAILED` | No |
//! | [`IdentityError::AgentStopped`] | `IDENTITY_AGENT_STOPPED` | No |
//! | [`IdentityError::InvalidDriverName`] | `IDENTITY_INVALID_DRIVER_NAME` | No |
//! | [`IdentityError::DuplicateDriver`] | `IDENTITY_DUPLICATE_DRIVER` | No |
//! | [`IdentityError::DriversFrozen`] | `IDENTITY_DRIVERS_FROZEN` | No |
//! | [`IdentityError::DuplicateFeature`] | `IDENTITY_DUPLICATE_FEATURE` | No |
//! | [`IdentityError::FeatureNotFound`] | `IDENTITY_FEATURE_NOT_FOUND` | No |
//! | [`IdentityError::Agent`] | `IDENTITY_AGENT` | No |

use crate::agent::AgentError;
use crate::config::ConfigError;
use crate::trampoline::ActionError;
use appid_types::ErrorCode;
use thiserror::Error;

/// Error returned by the identity service and its parties.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The configuration (or a configuration increment) is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The increment does not have the expected shape.
    #[error("invalid increment: {0}")]
    InvalidIncrement(String),

    /// A party with the same full name already exists.
    #[error("party '{0}' already exists: a party must first be destroyed before being added again")]
    NameCollision(String),

    /// The owner of the new parties is being destroyed.
    #[error("owner '{0}' is destroyed")]
    OwnerDestroyed(String),

    /// Dynamic setup failed: nothing was published.
    #[error("dynamic setup failed: {0}")]
    SetupFailed(ActionError),

    /// Only dynamic parties can be destroyed.
    #[error("party '{0}' is not dynamic and cannot be destroyed")]
    NotDynamic(String),

    /// The agent is not running.
    #[error("identity agent is not running")]
    NotRunning,

    /// The agent refused to start.
    #[error("identity agent refused to start")]
    StartRefused,

    /// Global setup failed.
    #[error("initialization failed: {0}")]
    InitializationFailed(ActionError),

    /// The agent stopped before the operation completed.
    #[error("identity agent stopped")]
    AgentStopped,

    /// A driver type name does not end with `FeatureDriver`.
    #[error("invalid type name '{0}': a feature driver type name must be suffixed with 'FeatureDriver'")]
    InvalidDriverName(String),

    /// Two drivers drive the same feature.
    #[error("feature driver '{0}' is already registered")]
    DuplicateDriver(String),

    /// Registration attempted after the agent started.
    #[error("cannot register feature driver '{0}': the identity agent already started")]
    DriversFrozen(String),

    /// A feature of this type is already attached.
    #[error("feature '{feature}' is already attached to '{party}'")]
    DuplicateFeature {
        party: String,
        feature: &'static str,
    },

    /// No feature of this type is attached.
    #[error("unable to find a feature '{feature}' in '{party}'")]
    FeatureNotFound {
        party: String,
        feature: &'static str,
    },

    /// Agent-level failure.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ErrorCode for IdentityError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "IDENTITY_CONFIG",
            Self::InvalidIncrement(_) => "IDENTITY_INVALID_INCREMENT",
            Self::NameCollision(_) => "IDENTITY_NAME_COLLISION",
            Self::OwnerDestroyed(_) => "IDENTITY_OWNER_DESTROYED",
            Self::SetupFailed(_) => "IDENTITY_SETUP_FAILED",
            Self::NotDynamic(_) => "IDENTITY_NOT_DYNAMIC",
            Self::NotRunning => "IDENTITY_NOT_RUNNING",
            Self::StartRefused => "IDENTITY_START_REFUSED",
            Self::InitializationFailed(_) => "IDENTITY_INITIALIZATION_FAILED",
            Self::AgentStopped => "IDENTITY_AGENT_STOPPED",
            Self::InvalidDriverName(_) => "IDENTITY_INVALID_DRIVER_NAME",
            Self::DuplicateDriver(_) => "IDENTITY_DUPLICATE_DRIVER",
            Self::DriversFrozen(_) => "IDENTITY_DRIVERS_FROZEN",
            Self::DuplicateFeature { .. } => "IDENTITY_DUPLICATE_FEATURE",
            Self::FeatureNotFound { .. } => "IDENTITY_FEATURE_NOT_FOUND",
            Self::Agent(_) => "IDENTITY_AGENT",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::NameCollision(_) | Self::SetupFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appid_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        let variants = vec![
            IdentityError::Config(ConfigError::ExternalRoot),
            IdentityError::InvalidIncrement("x".into()),
            IdentityError::NameCollision("D/$P/#Dev".into()),
            IdentityError::OwnerDestroyed("D/$D/#Dev".into()),
            IdentityError::SetupFailed(ActionError::ReturnedFalse),
            IdentityError::NotDynamic("D/$P/#Dev".into()),
            IdentityError::NotRunning,
            IdentityError::StartRefused,
            IdentityError::InitializationFailed(ActionError::failed("boom")),
            IdentityError::AgentStopped,
            IdentityError::InvalidDriverName("Sign".into()),
            IdentityError::DuplicateDriver("Sign".into()),
            IdentityError::DriversFrozen("Sign".into()),
            IdentityError::DuplicateFeature {
                party: "D/$P/#Dev".into(),
                feature: "u32",
            },
            IdentityError::FeatureNotFound {
                party: "D/$P/#Dev".into(),
                feature: "u32",
            },
            IdentityError::Agent(AgentError::MailboxClosed("a".into())),
        ];
        assert_error_codes(&variants, "IDENTITY_");
    }

    #[test]
    fn recoverable_variants() {
        assert!(IdentityError::NameCollision("x".into()).is_recoverable());
        assert!(!IdentityError::AgentStopped.is_recoverable());
        assert!(!IdentityError::Config(ConfigError::ExternalRoot).is_recoverable());
    }
}
