//! Trampoline errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`TrampolineError::AlreadyExecuted`] | `TRAMPOLINE_ALREADY_EXECUTED` | No |
//! | [`TrampolineError::AlreadyClaimed`] | `TRAMPOLINE_ALREADY_CLAIMED` | No |
//! | [`TrampolineError::PhaseViolation`] | `TRAMPOLINE_PHASE_VIOLATION` | No |
//! | [`ActionError::ReturnedFalse`] | `ACTION_RETURNED_FALSE` | No |
//! | [`ActionError::Failed`] | `ACTION_FAILED` | No |
//! | [`ActionError::Panicked`] | `ACTION_PANICKED` | No |
//! | [`ActionError::Aggregate`] | `ACTION_AGGREGATE` | No |
//!
//! [`TrampolineError`] reports misuse of the engine itself and is a
//! programming error. [`ActionError`] is what a failing action produces.

use super::Phase;
use appid_types::ErrorCode;
use std::any::Any;
use thiserror::Error;

/// Misuse of a trampoline or runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrampolineError {
    /// A runner can execute only once.
    #[error("trampoline runner has already been executed")]
    AlreadyExecuted,

    /// A trampoline can be bound to only one runner.
    #[error("trampoline is already bound to a runner")]
    AlreadyClaimed,

    /// Registration refused by the current phase.
    #[error("cannot register {attempted} during the {phase} phase")]
    PhaseViolation {
        attempted: &'static str,
        phase: Phase,
    },
}

impl ErrorCode for TrampolineError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExecuted => "TRAMPOLINE_ALREADY_EXECUTED",
            Self::AlreadyClaimed => "TRAMPOLINE_ALREADY_CLAIMED",
            Self::PhaseViolation { .. } => "TRAMPOLINE_PHASE_VIOLATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Failure of a single action or of a whole pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// A boolean action returned `false`.
    #[error("an action returned false")]
    ReturnedFalse,

    /// The action reported an error.
    #[error("{0}")]
    Failed(String),

    /// The action panicked.
    #[error("action panicked: {0}")]
    Panicked(String),

    /// Several actions failed in run-all mode.
    #[error("{} actions failed: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<ActionError>),
}

impl ActionError {
    /// Creates a [`ActionError::Failed`] from any displayable error.
    pub fn failed(message: impl ToString) -> Self {
        Self::Failed(message.to_string())
    }

    /// Converts a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }

    /// Folds collected failures: one stays as-is, several are aggregated.
    pub(crate) fn combine(mut failures: Vec<ActionError>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => failures.pop(),
            _ => Some(Self::Aggregate(failures)),
        }
    }

    /// The individual failures: the aggregated ones, or `self` alone.
    #[must_use]
    pub fn failures(&self) -> &[ActionError] {
        match self {
            Self::Aggregate(all) => all,
            single => std::slice::from_ref(single),
        }
    }
}

impl From<TrampolineError> for ActionError {
    fn from(err: TrampolineError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl ErrorCode for ActionError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReturnedFalse => "ACTION_RETURNED_FALSE",
            Self::Failed(_) => "ACTION_FAILED",
            Self::Panicked(_) => "ACTION_PANICKED",
            Self::Aggregate(_) => "ACTION_AGGREGATE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

fn join_messages(failures: &[ActionError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
