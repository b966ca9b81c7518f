//! Destroy state machine of owned parties.

use crate::IdentityError;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

const ALIVE: u8 = 0;
const DESTROYING: u8 = 1;
const DESTROYED: u8 = 2;

/// `Alive → Destroying → Destroyed`, monotonic.
pub(crate) struct DestroyState {
    state: AtomicU8,
    done: watch::Sender<bool>,
}

impl DestroyState {
    pub(crate) fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(ALIVE),
            done,
        }
    }

    /// `Alive → Destroying`. Only the first caller gets `true`.
    pub(crate) fn begin(&self) -> bool {
        self.state
            .compare_exchange(ALIVE, DESTROYING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True from the first destroy request on.
    pub(crate) fn is_destroyed(&self) -> bool {
        self.state.load(Ordering::Acquire) != ALIVE
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DESTROYED
    }

    pub(crate) fn complete(&self) {
        self.state.store(DESTROYED, Ordering::Release);
        self.done.send_replace(true);
    }

    /// Waits for [`complete`](Self::complete), or for `stopped` to resolve
    /// first.
    pub(crate) async fn wait(&self, stopped: impl Future<Output = ()>) -> Result<(), IdentityError> {
        let mut rx = self.done.subscribe();
        tokio::select! {
            // The sender lives in `self`: wait_for only fails once it is dropped.
            done = rx.wait_for(|done| *done) => done.map(|_| ()).map_err(|_| IdentityError::AgentStopped),
            () = stopped => {
                if self.is_completed() {
                    Ok(())
                } else {
                    Err(IdentityError::AgentStopped)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn transitions_are_monotonic() {
        let state = DestroyState::new();
        assert!(!state.is_destroyed());
        assert!(state.begin());
        assert!(!state.begin());
        assert!(state.is_destroyed());
        assert!(!state.is_completed());
        state.complete();
        assert!(state.is_completed());
        assert!(!state.begin());
    }

    #[tokio::test]
    async fn waiters_resolve_on_completion() {
        let state = Arc::new(DestroyState::new());
        state.begin();

        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait(std::future::pending()).await })
        };
        tokio::task::yield_now().await;
        state.complete();

        assert!(waiter.await.expect("join").is_ok());
        // After the fact.
        assert!(state.wait(std::future::pending()).await.is_ok());
    }

    #[tokio::test]
    async fn stopped_agent_fails_pending_waiters() {
        let state = DestroyState::new();
        state.begin();
        let err = state.wait(async {}).await.expect_err("never completed");
        assert!(matches!(err, IdentityError::AgentStopped));
    }
}
