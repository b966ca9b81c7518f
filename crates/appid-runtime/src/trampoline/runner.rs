//! One-shot trampoline execution.

use super::{ActionError, Job, Memory, Phase, Trampoline, TrampolineError};
use bitflags::bitflags;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

bitflags! {
    /// Outcome flags of a trampoline execution.
    ///
    /// An empty set means total success. Handler failures never abort a
    /// pass; they only raise the matching flag.
    ///
    /// | Flag | Meaning |
    /// |------|---------|
    /// | [`ERROR`](Self::ERROR) | at least one action failed |
    /// | [`HAS_SUCCESS_EXCEPTION`](Self::HAS_SUCCESS_EXCEPTION) | a success handler failed |
    /// | [`HAS_ERROR_EXCEPTION`](Self::HAS_ERROR_EXCEPTION) | an error handler failed |
    /// | [`HAS_FINALLY_EXCEPTION`](Self::HAS_FINALLY_EXCEPTION) | a finally handler failed |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TrampolineResult: u8 {
        const ERROR                 = 0b0001;
        const HAS_SUCCESS_EXCEPTION = 0b0010;
        const HAS_ERROR_EXCEPTION   = 0b0100;
        const HAS_FINALLY_EXCEPTION = 0b1000;
    }
}

impl TrampolineResult {
    /// No action failed and no handler failed.
    #[must_use]
    pub fn is_total_success(self) -> bool {
        self.is_empty()
    }
}

/// What an execution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrampolineOutcome {
    /// Flags of the execution.
    pub result: TrampolineResult,
    /// The action failure, aggregated in run-all mode.
    pub failure: Option<ActionError>,
}

impl TrampolineOutcome {
    /// See [`TrampolineResult::is_total_success`].
    #[must_use]
    pub fn is_total_success(&self) -> bool {
        self.result.is_total_success()
    }

    /// Converts to a `Result`, keeping only action failures.
    ///
    /// # Errors
    ///
    /// Returns the action failure if any action failed.
    pub fn into_result(self) -> Result<TrampolineResult, ActionError> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.result),
        }
    }
}

/// Executes a [`Trampoline`] once.
#[derive(Debug)]
pub struct TrampolineRunner {
    trampoline: Trampoline,
    memory: Memory,
    executed: bool,
}

impl TrampolineRunner {
    /// Creates a runner over a fresh trampoline.
    #[must_use]
    pub fn new() -> Self {
        let trampoline = Trampoline::new();
        // Fresh trampoline: the claim always succeeds.
        let _ = trampoline.claim();
        Self {
            trampoline,
            memory: Memory::default(),
            executed: false,
        }
    }

    /// Binds a runner to an existing trampoline.
    ///
    /// # Errors
    ///
    /// [`TrampolineError::AlreadyClaimed`] if another runner owns it.
    pub fn with_trampoline(trampoline: Trampoline, memory: Memory) -> Result<Self, TrampolineError> {
        trampoline.claim()?;
        Ok(Self {
            trampoline,
            memory,
            executed: false,
        })
    }

    /// The trampoline this runner executes.
    #[must_use]
    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }

    /// Memory shared by the actions of this run.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Runs actions until the first failure, then the handlers.
    ///
    /// # Errors
    ///
    /// [`TrampolineError::AlreadyExecuted`] on a second call.
    pub async fn execute(&mut self) -> Result<TrampolineOutcome, TrampolineError> {
        self.run(true).await
    }

    /// Runs every action, aggregating failures, then the handlers.
    ///
    /// # Errors
    ///
    /// [`TrampolineError::AlreadyExecuted`] on a second call.
    pub async fn execute_all(&mut self) -> Result<TrampolineOutcome, TrampolineError> {
        self.run(false).await
    }

    async fn run(&mut self, stop_on_first_error: bool) -> Result<TrampolineOutcome, TrampolineError> {
        if self.executed {
            return Err(TrampolineError::AlreadyExecuted);
        }
        self.executed = true;

        let mut failures = Vec::new();
        let mut round = 0_usize;
        'rounds: loop {
            let jobs = self.trampoline.take_round();
            if jobs.is_empty() {
                break;
            }
            round += 1;
            debug!(round, count = jobs.len(), "Executing trampoline round");
            for job in jobs {
                if let Err(e) = run_job(job).await {
                    debug!(round, error = %e, "Trampoline action failed");
                    failures.push(e);
                    if stop_on_first_error {
                        break 'rounds;
                    }
                }
            }
        }

        let failure = ActionError::combine(failures);
        let mut result = TrampolineResult::empty();
        match &failure {
            None => {
                if self.run_handlers(Phase::Success).await {
                    result |= TrampolineResult::HAS_SUCCESS_EXCEPTION;
                }
            }
            Some(_) => {
                result |= TrampolineResult::ERROR;
                if self.run_handlers(Phase::Error).await {
                    result |= TrampolineResult::HAS_ERROR_EXCEPTION;
                }
            }
        }
        if self.run_handlers(Phase::Finally).await {
            result |= TrampolineResult::HAS_FINALLY_EXCEPTION;
        }
        self.trampoline.enter(Phase::Completed);

        Ok(TrampolineOutcome { result, failure })
    }

    /// Runs the rounds of a handler phase. Returns true if any handler failed.
    async fn run_handlers(&self, phase: Phase) -> bool {
        self.trampoline.enter(phase);
        let mut failed = false;
        loop {
            let handlers = self.trampoline.take_round();
            if handlers.is_empty() {
                return failed;
            }
            for handler in handlers {
                if let Err(e) = run_job(handler).await {
                    failed = true;
                    match phase {
                        Phase::Finally => {
                            error!(error = %e, "Finally handler failed. This is ignored.");
                        }
                        _ => warn!(%phase, error = %e, "Handler failed. This is ignored."),
                    }
                }
            }
        }
    }
}

impl Default for TrampolineRunner {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: Job) -> Result<(), ActionError> {
    match AssertUnwindSafe(async move { job().await }).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ActionError::from_panic(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, s: &str) {
        log.lock().push(s.to_string());
    }

    #[tokio::test]
    async fn rounds_run_follow_ups_after_current_round() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline().clone();
        let calls = log();

        let (t1, c1) = (t.clone(), calls.clone());
        t.add(move || {
            push(&c1, "a");
            let c = c1.clone();
            t1.add(move || {
                push(&c, "a-follow-up");
                Ok(())
            })?;
            Ok(())
        })
        .expect("add");
        let c2 = calls.clone();
        t.add(move || {
            push(&c2, "b");
            Ok(())
        })
        .expect("add");

        let outcome = runner.execute_all().await.expect("first execution");
        assert!(outcome.is_total_success());
        assert_eq!(*calls.lock(), vec!["a", "b", "a-follow-up"]);
    }

    #[tokio::test]
    async fn all_action_kinds_are_supported() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline();
        t.add(|| Ok(())).expect("add");
        t.add_gentle(|| true).expect("add");
        t.add_async(|| async { Ok(()) }).expect("add");
        t.add_async_gentle(|| async { true }).expect("add");

        let outcome = runner.execute().await.expect("execution");
        assert_eq!(outcome.result, TrampolineResult::empty());
        assert!(outcome.failure.is_none());
    }

    #[tokio::test]
    async fn false_is_a_failure() {
        let mut runner = TrampolineRunner::new();
        runner.trampoline().add_gentle(|| false).expect("add");
        let outcome = runner.execute_all().await.expect("execution");
        assert_eq!(outcome.result, TrampolineResult::ERROR);
        assert_eq!(outcome.failure, Some(ActionError::ReturnedFalse));
    }

    #[tokio::test]
    async fn execute_stops_on_first_failure() {
        let mut runner = TrampolineRunner::new();
        let calls = log();
        let t = runner.trampoline();
        t.add(|| Err(ActionError::failed("first"))).expect("add");
        let c = calls.clone();
        t.add(move || {
            push(&c, "second");
            Ok(())
        })
        .expect("add");

        let outcome = runner.execute().await.expect("execution");
        assert_eq!(outcome.failure, Some(ActionError::failed("first")));
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn execute_all_aggregates_failures() {
        let mut runner = TrampolineRunner::new();
        let calls = log();
        let t = runner.trampoline();
        t.add(|| Err(ActionError::failed("first"))).expect("add");
        let c = calls.clone();
        t.add(move || {
            push(&c, "second");
            Ok(())
        })
        .expect("add");
        t.add_async_gentle(|| async { false }).expect("add");

        let outcome = runner.execute_all().await.expect("execution");
        assert_eq!(*calls.lock(), vec!["second"]);
        let failure = outcome.failure.expect("failures");
        assert_eq!(
            failure,
            ActionError::Aggregate(vec![ActionError::failed("first"), ActionError::ReturnedFalse])
        );
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let mut runner = TrampolineRunner::new();
        runner
            .trampoline()
            .add(|| panic!("driver exploded"))
            .expect("add");
        let outcome = runner.execute_all().await.expect("execution");
        assert_eq!(
            outcome.failure,
            Some(ActionError::Panicked("driver exploded".into()))
        );
    }

    #[tokio::test]
    async fn success_handlers_chain_in_rounds() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline().clone();
        let calls = log();

        let c = calls.clone();
        t.add(move || {
            push(&c, "action");
            Ok(())
        })
        .expect("add");
        let (t2, c2) = (t.clone(), calls.clone());
        t.on_success(move || {
            push(&c2, "success-1");
            let c = c2.clone();
            t2.on_success(move || {
                push(&c, "success-2");
                Ok(())
            })?;
            Ok(())
        })
        .expect("handler");
        let c3 = calls.clone();
        t.on_error(move || {
            push(&c3, "error");
            Ok(())
        })
        .expect("handler");
        let c4 = calls.clone();
        t.finally(move || {
            push(&c4, "finally");
            Ok(())
        })
        .expect("handler");

        let outcome = runner.execute_all().await.expect("execution");
        assert!(outcome.is_total_success());
        assert_eq!(
            *calls.lock(),
            vec!["action", "success-1", "success-2", "finally"]
        );
    }

    #[tokio::test]
    async fn error_handlers_run_instead_of_success() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline().clone();
        let calls = log();

        t.add_gentle(|| false).expect("add");
        let c = calls.clone();
        t.on_success(move || {
            push(&c, "success");
            Ok(())
        })
        .expect("handler");
        let (t2, c2) = (t.clone(), calls.clone());
        t.on_error(move || {
            push(&c2, "error");
            assert!(t2.on_success(|| Ok(())).is_err());
            assert!(t2.add(|| Ok(())).is_err());
            Ok(())
        })
        .expect("handler");
        let c3 = calls.clone();
        t.finally(move || {
            push(&c3, "finally");
            Ok(())
        })
        .expect("handler");

        let outcome = runner.execute_all().await.expect("execution");
        assert_eq!(outcome.result, TrampolineResult::ERROR);
        assert_eq!(*calls.lock(), vec!["error", "finally"]);
    }

    #[tokio::test]
    async fn handler_failures_are_flagged_and_swallowed() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline();
        t.on_success(|| Err(ActionError::failed("bad success")))
            .expect("handler");
        t.finally(|| panic!("bad finally")).expect("handler");

        let outcome = runner.execute_all().await.expect("execution");
        assert_eq!(
            outcome.result,
            TrampolineResult::HAS_SUCCESS_EXCEPTION | TrampolineResult::HAS_FINALLY_EXCEPTION
        );
        assert!(outcome.failure.is_none());
        assert!(!outcome.is_total_success());
    }

    #[tokio::test]
    async fn error_handler_failure_is_flagged() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline();
        t.add_gentle(|| false).expect("add");
        t.on_error(|| Err(ActionError::failed("bad error"))).expect("handler");

        let outcome = runner.execute_all().await.expect("execution");
        assert_eq!(
            outcome.result,
            TrampolineResult::ERROR | TrampolineResult::HAS_ERROR_EXCEPTION
        );
    }

    #[tokio::test]
    async fn second_execution_fails_loudly() {
        let mut runner = TrampolineRunner::new();
        runner.execute_all().await.expect("first execution");
        assert_eq!(
            runner.execute().await,
            Err(TrampolineError::AlreadyExecuted)
        );
    }

    #[tokio::test]
    async fn trampoline_binds_to_one_runner() {
        let t = Trampoline::new();
        let _runner = TrampolineRunner::with_trampoline(t.clone(), Memory::default())
            .expect("first claim");
        let second = TrampolineRunner::with_trampoline(t, Memory::default());
        assert!(matches!(second, Err(TrampolineError::AlreadyClaimed)));
    }

    #[tokio::test]
    async fn completed_trampoline_refuses_registrations() {
        let mut runner = TrampolineRunner::new();
        let t = runner.trampoline().clone();
        runner.execute_all().await.expect("execution");
        assert_eq!(t.phase(), Phase::Completed);
        assert!(t.finally(|| Ok(())).is_err());
    }

    #[test]
    fn outcome_into_result() {
        let ok = TrampolineOutcome {
            result: TrampolineResult::HAS_FINALLY_EXCEPTION,
            failure: None,
        };
        assert_eq!(ok.into_result(), Ok(TrampolineResult::HAS_FINALLY_EXCEPTION));

        let err = TrampolineOutcome {
            result: TrampolineResult::ERROR,
            failure: Some(ActionError::ReturnedFalse),
        };
        assert_eq!(err.into_result(), Err(ActionError::ReturnedFalse));
    }
}
