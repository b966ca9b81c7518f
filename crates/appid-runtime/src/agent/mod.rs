//! Single-writer execution agent.
//!
//! A [`MicroAgent`] owns one [`AgentHandler`] and runs it on a dedicated
//! tokio task. Everything the handler does happens inside that task, one
//! message at a time, so the handler's state needs no locking.
//!
//! # Architecture
//!
//! ```text
//!  callers ──post()──────┐
//!  callers ──post_task()─┤      unbounded FIFO         ┌─────────────────┐
//!  timer ───Heartbeat────┼────────────────────────────►│   run loop      │
//!  send_stop() ──Stop────┘                             │ (one at a time) │
//!                                                      └───────┬─────────┘
//!                                                              │ &mut H
//!                                                       ┌──────▼──────┐
//!                                                       │ AgentHandler│
//!                                                       └─────────────┘
//! ```
//!
//! # States
//!
//! ```text
//! WaitingForStart ──try_start()──► Running ──send_stop()──► Stopped
//!        │
//!        └── on_try_start() veto: stays WaitingForStart for good
//! ```
//!
//! # Messages
//!
//! | Message | Source | Handler call |
//! |---------|--------|--------------|
//! | action / task | [`MicroAgent::post_action`], [`MicroAgent::post_task`] | the posted `fn` |
//! | typed job | [`MicroAgent::post`] | [`AgentHandler::execute_job`] |
//! | heartbeat | timer | [`AgentHandler::on_heartbeat`] |
//! | stop | [`MicroAgent::send_stop`] | [`AgentHandler::on_stop`] |
//!
//! Posted actions are plain `fn` pointers with an explicit argument: they
//! cannot capture state, so what a message touches is visible at the call
//! site.
//!
//! # Failures
//!
//! An `Err` or a panic from any message is logged and the loop carries on.
//! A failing `on_stop` is logged too, and the loop still closes.

mod error;
mod job;
mod micro;

pub use error::AgentError;
pub use job::{ActionFn, TaskFn};
pub use micro::{MicroAgent, MIN_HEARTBEAT_PERIOD};

use async_trait::async_trait;

/// Lifecycle state of a [`MicroAgent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningStatus {
    /// Created, not started (or start vetoed).
    WaitingForStart,
    /// The run loop is processing messages.
    Running,
    /// Stop requested; the loop drains and exits.
    Stopped,
}

/// Behavior driven by a [`MicroAgent`].
///
/// All methods except [`on_try_start`](Self::on_try_start) run on the
/// agent task.
#[async_trait]
pub trait AgentHandler: Send + 'static {
    /// Typed job understood by this handler.
    type Job: Send + 'static;

    /// Start precondition. Returning `false` vetoes the start.
    ///
    /// Runs on the caller of [`MicroAgent::try_start`], under the agent's
    /// control lock: it must not call back into the agent.
    fn on_try_start(&mut self) -> bool {
        true
    }

    /// First call made by the run loop.
    async fn on_start(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Periodic tick. `count` increases by one per executed heartbeat.
    async fn on_heartbeat(&mut self, _count: u64) -> Result<(), AgentError> {
        Ok(())
    }

    /// Executes a typed job.
    async fn execute_job(&mut self, job: Self::Job) -> Result<(), AgentError>;

    /// Last call made by the run loop.
    async fn on_stop(&mut self) -> Result<(), AgentError> {
        Ok(())
    }
}
