//! Feature driver errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`DriverError::Failed`] | `DRIVER_FAILED` | No |
//! | [`DriverError::Party`] | `DRIVER_PARTY` | No |

use crate::trampoline::ActionError;
use crate::IdentityError;
use appid_types::ErrorCode;
use thiserror::Error;

/// Error returned by a [`FeatureDriver`](super::FeatureDriver).
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver could not set up or tear down its feature.
    #[error("feature '{feature}': {message}")]
    Failed { feature: String, message: String },

    /// A party operation made by the driver failed.
    #[error(transparent)]
    Party(#[from] IdentityError),
}

impl DriverError {
    /// Creates a [`DriverError::Failed`].
    pub fn failed(feature: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            feature: feature.into(),
            message: message.to_string(),
        }
    }
}

impl ErrorCode for DriverError {
    fn code(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "DRIVER_FAILED",
            Self::Party(_) => "DRIVER_PARTY",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

impl From<DriverError> for ActionError {
    fn from(err: DriverError) -> Self {
        ActionError::failed(err)
    }
}
