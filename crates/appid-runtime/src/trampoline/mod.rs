//! Round-based action executor.
//!
//! A [`Trampoline`] collects actions and handlers; a [`TrampolineRunner`]
//! executes them once.
//!
//! # Execution
//!
//! ```text
//!  actions ──► round 1 ──► round 2 ──► ... (until a round adds nothing)
//!                 │
//!        ┌────────┴────────┐
//!   no failure         any failure
//!        │                 │
//!   success rounds     error rounds
//!        └────────┬────────┘
//!           finally rounds
//! ```
//!
//! A round runs the actions queued when it starts. Anything queued while
//! the round runs waits for the next round, so an action can schedule a
//! follow-up that is guaranteed to run after every action of its own round.
//! Handler phases work the same way: a success handler may register another
//! success handler, which then runs in a later success round.
//!
//! # Registration Rules
//!
//! | Registering | Actions | Success | Error | Finally |
//! |-------------|---------|---------|-------|---------|
//! | action | yes | no | no | no |
//! | success handler | yes | yes | no | no |
//! | error handler | yes | no | yes | no |
//! | finally handler | yes | yes | yes | yes |
//!
//! Refused registrations return [`TrampolineError::PhaseViolation`].
//!
//! # Example
//!
//! ```
//! use appid_runtime::trampoline::{ActionError, TrampolineRunner};
//!
//! # tokio_test_block(async {
//! let mut runner = TrampolineRunner::new();
//! let t = runner.trampoline().clone();
//! let follow_up = t.clone();
//! t.add(move || {
//!     follow_up.add(|| Ok(()))?;
//!     Ok(())
//! })
//! .unwrap();
//! t.add_gentle(|| true).unwrap();
//!
//! let outcome = runner.execute_all().await.unwrap();
//! assert!(outcome.is_total_success());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod error;
mod memory;
mod runner;

pub use error::{ActionError, TrampolineError};
pub use memory::Memory;
pub use runner::{TrampolineOutcome, TrampolineResult, TrampolineRunner};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) type Job = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ActionError>> + Send>;

/// Current step of a trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Actions are being collected or executed.
    Actions,
    /// Success handlers are running.
    Success,
    /// Error handlers are running.
    Error,
    /// Finally handlers are running.
    Finally,
    /// Execution is over.
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Actions => "actions",
            Self::Success => "success",
            Self::Error => "error",
            Self::Finally => "finally",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct Queues {
    actions: VecDeque<Job>,
    success: VecDeque<Job>,
    error: VecDeque<Job>,
    finally: VecDeque<Job>,
}

struct State {
    phase: Phase,
    queues: Queues,
}

struct Inner {
    state: Mutex<State>,
    claimed: AtomicBool,
}

/// Registration handle of a trampoline.
///
/// Cloning shares the same queues, so an executing action can hold a clone
/// and enqueue follow-up work.
#[derive(Clone)]
pub struct Trampoline {
    inner: Arc<Inner>,
}

impl Trampoline {
    /// Creates an empty, unclaimed trampoline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: Phase::Actions,
                    queues: Queues::default(),
                }),
                claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Adds an action that fails by returning an error.
    ///
    /// # Errors
    ///
    /// Refused once a handler phase has begun.
    pub fn add<F>(&self, action: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Result<(), ActionError> + Send + 'static,
    {
        self.push_action(Box::new(move || Box::pin(async move { action() })))
    }

    /// Adds an action that fails by returning `false`.
    ///
    /// # Errors
    ///
    /// Refused once a handler phase has begun.
    pub fn add_gentle<F>(&self, action: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        self.push_action(Box::new(move || {
            Box::pin(async move { gentle(action()) })
        }))
    }

    /// Adds an asynchronous action.
    ///
    /// # Errors
    ///
    /// Refused once a handler phase has begun.
    pub fn add_async<F, Fut>(&self, action: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.push_action(Box::new(move || Box::pin(async move { action().await })))
    }

    /// Adds an asynchronous action that fails by returning `false`.
    ///
    /// # Errors
    ///
    /// Refused once a handler phase has begun.
    pub fn add_async_gentle<F, Fut>(&self, action: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.push_action(Box::new(move || {
            Box::pin(async move { gentle(action().await) })
        }))
    }

    /// Registers a handler that runs when every action succeeded.
    ///
    /// # Errors
    ///
    /// Refused during the error and finally phases.
    pub fn on_success<F>(&self, handler: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Result<(), ActionError> + Send + 'static,
    {
        self.push_handler(
            Phase::Success,
            Box::new(move || Box::pin(async move { handler() })),
        )
    }

    /// Asynchronous [`on_success`](Self::on_success).
    ///
    /// # Errors
    ///
    /// Refused during the error and finally phases.
    pub fn on_success_async<F, Fut>(&self, handler: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.push_handler(
            Phase::Success,
            Box::new(move || Box::pin(async move { handler().await })),
        )
    }

    /// Registers a handler that runs when at least one action failed.
    ///
    /// # Errors
    ///
    /// Refused during the success and finally phases.
    pub fn on_error<F>(&self, handler: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Result<(), ActionError> + Send + 'static,
    {
        self.push_handler(
            Phase::Error,
            Box::new(move || Box::pin(async move { handler() })),
        )
    }

    /// Asynchronous [`on_error`](Self::on_error).
    ///
    /// # Errors
    ///
    /// Refused during the success and finally phases.
    pub fn on_error_async<F, Fut>(&self, handler: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.push_handler(
            Phase::Error,
            Box::new(move || Box::pin(async move { handler().await })),
        )
    }

    /// Registers a handler that always runs last.
    ///
    /// # Errors
    ///
    /// Refused only once execution has completed.
    pub fn finally<F>(&self, handler: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Result<(), ActionError> + Send + 'static,
    {
        self.push_handler(
            Phase::Finally,
            Box::new(move || Box::pin(async move { handler() })),
        )
    }

    /// Asynchronous [`finally`](Self::finally).
    ///
    /// # Errors
    ///
    /// Refused only once execution has completed.
    pub fn finally_async<F, Fut>(&self, handler: F) -> Result<(), TrampolineError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        self.push_handler(
            Phase::Finally,
            Box::new(move || Box::pin(async move { handler().await })),
        )
    }

    fn push_action(&self, job: Job) -> Result<(), TrampolineError> {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Actions {
            return Err(TrampolineError::PhaseViolation {
                attempted: "an action",
                phase: state.phase,
            });
        }
        state.queues.actions.push_back(job);
        Ok(())
    }

    fn push_handler(&self, kind: Phase, job: Job) -> Result<(), TrampolineError> {
        let mut state = self.inner.state.lock();
        let allowed = match kind {
            Phase::Success => matches!(state.phase, Phase::Actions | Phase::Success),
            Phase::Error => matches!(state.phase, Phase::Actions | Phase::Error),
            _ => state.phase != Phase::Completed,
        };
        if !allowed {
            let attempted = match kind {
                Phase::Success => "a success handler",
                Phase::Error => "an error handler",
                _ => "a finally handler",
            };
            return Err(TrampolineError::PhaseViolation {
                attempted,
                phase: state.phase,
            });
        }
        let queue = match kind {
            Phase::Success => &mut state.queues.success,
            Phase::Error => &mut state.queues.error,
            _ => &mut state.queues.finally,
        };
        queue.push_back(job);
        Ok(())
    }

    /// Claims the trampoline for a runner. Succeeds once.
    pub(crate) fn claim(&self) -> Result<(), TrampolineError> {
        self.inner
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| TrampolineError::AlreadyClaimed)
    }

    /// Moves to `phase`, dropping work that can no longer run.
    pub(crate) fn enter(&self, phase: Phase) {
        let mut state = self.inner.state.lock();
        state.phase = phase;
        match phase {
            Phase::Success => {
                state.queues.actions.clear();
                state.queues.error.clear();
            }
            Phase::Error => {
                state.queues.actions.clear();
                state.queues.success.clear();
            }
            Phase::Finally => {
                state.queues.success.clear();
                state.queues.error.clear();
            }
            Phase::Completed => state.queues = Queues::default(),
            Phase::Actions => {}
        }
    }

    /// Takes every job queued for the current phase: one round.
    pub(crate) fn take_round(&self) -> Vec<Job> {
        let mut state = self.inner.state.lock();
        let phase = state.phase;
        let queue = match phase {
            Phase::Actions => &mut state.queues.actions,
            Phase::Success => &mut state.queues.success,
            Phase::Error => &mut state.queues.error,
            Phase::Finally => &mut state.queues.finally,
            Phase::Completed => return Vec::new(),
        };
        queue.drain(..).collect()
    }
}

impl Default for Trampoline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Trampoline")
            .field("phase", &state.phase)
            .field("actions", &state.queues.actions.len())
            .field("claimed", &self.inner.claimed.load(Ordering::Relaxed))
            .finish()
    }
}

fn gentle(ok: bool) -> Result<(), ActionError> {
    if ok {
        Ok(())
    } else {
        Err(ActionError::ReturnedFalse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_are_refused_outside_action_phase() {
        let t = Trampoline::new();
        t.add(|| Ok(())).expect("action phase accepts actions");
        t.enter(Phase::Success);
        let err = t.add(|| Ok(())).expect_err("refused");
        assert_eq!(
            err,
            TrampolineError::PhaseViolation {
                attempted: "an action",
                phase: Phase::Success
            }
        );
    }

    #[test]
    fn handler_phase_matrix() {
        let t = Trampoline::new();
        t.enter(Phase::Success);
        assert!(t.on_success(|| Ok(())).is_ok());
        assert!(t.on_error(|| Ok(())).is_err());
        assert!(t.finally(|| Ok(())).is_ok());

        let t = Trampoline::new();
        t.enter(Phase::Error);
        assert!(t.on_success(|| Ok(())).is_err());
        assert!(t.on_error(|| Ok(())).is_ok());
        assert!(t.finally(|| Ok(())).is_ok());

        let t = Trampoline::new();
        t.enter(Phase::Finally);
        assert!(t.on_success(|| Ok(())).is_err());
        assert!(t.on_error(|| Ok(())).is_err());
        assert!(t.add_gentle(|| true).is_err());
        assert!(t.finally(|| Ok(())).is_ok());

        t.enter(Phase::Completed);
        assert!(t.finally(|| Ok(())).is_err());
    }

    #[test]
    fn claim_succeeds_once() {
        let t = Trampoline::new();
        assert!(t.claim().is_ok());
        assert_eq!(t.clone().claim(), Err(TrampolineError::AlreadyClaimed));
    }

    #[test]
    fn take_round_drains_current_queue() {
        let t = Trampoline::new();
        t.add(|| Ok(())).expect("add");
        t.add_gentle(|| false).expect("add");
        t.on_success(|| Ok(())).expect("handler");
        assert_eq!(t.take_round().len(), 2);
        assert!(t.take_round().is_empty());

        t.enter(Phase::Success);
        assert_eq!(t.take_round().len(), 1);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Finally.to_string(), "finally");
        assert_eq!(Phase::Actions.to_string(), "actions");
    }
}
