//! Agent errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`AgentError::MailboxClosed`] | `AGENT_MAILBOX_CLOSED` | No |
//! | [`AgentError::InvalidHeartbeat`] | `AGENT_INVALID_HEARTBEAT` | No |
//! | [`AgentError::Handler`] | `AGENT_HANDLER_FAILED` | Yes |
//! | [`AgentError::Panicked`] | `AGENT_PANICKED` | No |

use appid_types::ErrorCode;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Agent error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The run loop has exited; nothing posted now will run.
    #[error("agent '{0}' mailbox is closed")]
    MailboxClosed(String),

    /// Heartbeat period below the minimum.
    #[error("heartbeat period {0:?} is below the 20ms minimum")]
    InvalidHeartbeat(Duration),

    /// A handler reported a failure.
    #[error("{0}")]
    Handler(String),

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl AgentError {
    /// Wraps any displayable error as a handler failure.
    pub fn handler(message: impl ToString) -> Self {
        Self::Handler(message.to_string())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }
}

impl ErrorCode for AgentError {
    fn code(&self) -> &'static str {
        match self {
            Self::MailboxClosed(_) => "AGENT_MAILBOX_CLOSED",
            Self::InvalidHeartbeat(_) => "AGENT_INVALID_HEARTBEAT",
            Self::Handler(_) => "AGENT_HANDLER_FAILED",
            Self::Panicked(_) => "AGENT_PANICKED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Handler(_))
    }
}
