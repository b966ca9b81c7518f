//! The agent and its run loop.

use super::job::{Action, ActionFn, AgentMessage, Task, TaskFn};
use super::{AgentError, AgentHandler, RunningStatus};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Shortest accepted heartbeat period.
pub const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_millis(20);

/// Tracks whether a heartbeat is pending or running.
#[derive(Default)]
struct HeartbeatGate {
    busy: AtomicBool,
    /// Ticks refused since the last executed heartbeat.
    blocked: AtomicU64,
    /// Ticks refused since start.
    skipped: AtomicU64,
}

struct Control<H: AgentHandler> {
    status: RunningStatus,
    start_attempted: bool,
    pending: Option<(H, mpsc::UnboundedReceiver<AgentMessage<H>>)>,
    timer: Option<JoinHandle<()>>,
}

/// Single-consumer actor running an [`AgentHandler`].
///
/// Messages can be posted before [`try_start`](Self::try_start); they are
/// processed once the agent runs.
///
/// # Example
///
/// ```
/// use appid_runtime::agent::{AgentError, AgentHandler, MicroAgent, RunningStatus};
/// use async_trait::async_trait;
///
/// struct Counter(u32);
///
/// #[async_trait]
/// impl AgentHandler for Counter {
///     type Job = u32;
///
///     async fn execute_job(&mut self, job: u32) -> Result<(), AgentError> {
///         self.0 += job;
///         Ok(())
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let agent = MicroAgent::new("counter", Counter(0), None).unwrap();
/// agent.post(2).unwrap();
/// assert_eq!(agent.try_start(), RunningStatus::Running);
/// agent.send_stop();
/// agent.join().await;
/// # });
/// ```
pub struct MicroAgent<H: AgentHandler> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<AgentMessage<H>>,
    control: Mutex<Control<H>>,
    heartbeat: Option<Duration>,
    gate: Arc<HeartbeatGate>,
    finished: Arc<watch::Sender<bool>>,
}

impl<H: AgentHandler> MicroAgent<H> {
    /// Creates a stopped agent around `handler`.
    ///
    /// # Errors
    ///
    /// [`AgentError::InvalidHeartbeat`] if `heartbeat` is below
    /// [`MIN_HEARTBEAT_PERIOD`].
    pub fn new(
        name: impl Into<Arc<str>>,
        handler: H,
        heartbeat: Option<Duration>,
    ) -> Result<Self, AgentError> {
        if let Some(period) = heartbeat {
            if period < MIN_HEARTBEAT_PERIOD {
                return Err(AgentError::InvalidHeartbeat(period));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let (finished, _) = watch::channel(false);
        Ok(Self {
            name: name.into(),
            tx,
            control: Mutex::new(Control {
                status: RunningStatus::WaitingForStart,
                start_attempted: false,
                pending: Some((handler, rx)),
                timer: None,
            }),
            heartbeat,
            gate: Arc::new(HeartbeatGate::default()),
            finished: Arc::new(finished),
        })
    }

    /// Agent name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RunningStatus {
        self.control.lock().status
    }

    /// Heartbeat ticks refused because the previous one had not finished.
    #[must_use]
    pub fn skipped_heartbeats(&self) -> u64 {
        self.gate.skipped.load(Ordering::Relaxed)
    }

    /// Attempts `WaitingForStart → Running`, once.
    ///
    /// Must be called from within a tokio runtime. Returns the resulting
    /// status; a vetoed start leaves the agent `WaitingForStart` for good.
    pub fn try_start(&self) -> RunningStatus {
        let mut control = self.control.lock();
        if control.start_attempted {
            return control.status;
        }
        control.start_attempted = true;

        let approved = control
            .pending
            .as_mut()
            .is_some_and(|(handler, _)| handler.on_try_start());
        if !approved {
            warn!(agent = %self.name, "Agent start vetoed");
            return control.status;
        }
        let Some((handler, rx)) = control.pending.take() else {
            return control.status;
        };

        tokio::spawn(run_loop(
            Arc::clone(&self.name),
            handler,
            rx,
            self.tx.clone(),
            Arc::clone(&self.gate),
            Arc::clone(&self.finished),
        ));
        if let Some(period) = self.heartbeat {
            control.timer = Some(tokio::spawn(heartbeat_timer::<H>(
                Arc::clone(&self.name),
                period,
                self.tx.clone(),
                Arc::clone(&self.gate),
            )));
        }
        control.status = RunningStatus::Running;
        info!(agent = %self.name, heartbeat = ?self.heartbeat, "Agent started");
        RunningStatus::Running
    }

    /// Requests `Running → Stopped`.
    ///
    /// Disables the heartbeat and enqueues the stop sentinel. Returns
    /// `false` if the agent was not running.
    pub fn send_stop(&self) -> bool {
        let mut control = self.control.lock();
        if control.status != RunningStatus::Running {
            return false;
        }
        control.status = RunningStatus::Stopped;
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        debug!(agent = %self.name, "Agent stop requested");
        self.tx.send(AgentMessage::Stop).is_ok()
    }

    /// Waits for the run loop to exit.
    ///
    /// Resolves immediately if the agent never started.
    pub async fn join(&self) {
        if self.status() == RunningStatus::WaitingForStart {
            return;
        }
        let mut rx = self.finished.subscribe();
        // The sender lives in `self`: wait_for only fails once it is dropped.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// True once the run loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Posts a typed job.
    ///
    /// # Errors
    ///
    /// [`AgentError::MailboxClosed`] once the loop has exited.
    pub fn post(&self, job: H::Job) -> Result<(), AgentError> {
        self.send(AgentMessage::Typed(job))
    }

    /// Posts a synchronous action with its argument.
    ///
    /// # Errors
    ///
    /// [`AgentError::MailboxClosed`] once the loop has exited.
    pub fn post_action<T: Send + 'static>(
        &self,
        arg: T,
        action: ActionFn<H, T>,
    ) -> Result<(), AgentError> {
        self.send(AgentMessage::Erased(Box::new(Action { arg, action })))
    }

    /// Posts an asynchronous action with its argument.
    ///
    /// # Errors
    ///
    /// [`AgentError::MailboxClosed`] once the loop has exited.
    pub fn post_task<T: Send + 'static>(&self, arg: T, task: TaskFn<H, T>) -> Result<(), AgentError> {
        self.send(AgentMessage::Erased(Box::new(Task { arg, task })))
    }

    fn send(&self, message: AgentMessage<H>) -> Result<(), AgentError> {
        self.tx
            .send(message)
            .map_err(|_| AgentError::MailboxClosed(self.name.to_string()))
    }
}

impl<H: AgentHandler> Drop for MicroAgent<H> {
    fn drop(&mut self) {
        let mut control = self.control.lock();
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        if control.status == RunningStatus::Running {
            control.status = RunningStatus::Stopped;
            let _ = self.tx.send(AgentMessage::Stop);
        }
    }
}

async fn run_loop<H: AgentHandler>(
    name: Arc<str>,
    mut handler: H,
    mut rx: mpsc::UnboundedReceiver<AgentMessage<H>>,
    tx: mpsc::UnboundedSender<AgentMessage<H>>,
    gate: Arc<HeartbeatGate>,
    finished: Arc<watch::Sender<bool>>,
) {
    if let Err(e) = guarded(handler.on_start()).await {
        error!(agent = %name, error = %e, "Agent start handler failed");
    }

    let mut beats = 0_u64;
    while let Some(message) = rx.recv().await {
        match message {
            AgentMessage::Erased(job) => {
                if let Err(e) = guarded(job.run(&mut handler)).await {
                    error!(agent = %name, error = %e, "Unhandled error while executing job");
                }
            }
            AgentMessage::Typed(job) => {
                if let Err(e) = guarded(handler.execute_job(job)).await {
                    error!(agent = %name, error = %e, "Unhandled error while executing job");
                }
            }
            AgentMessage::Heartbeat => {
                gate.blocked.store(0, Ordering::Relaxed);
                let count = beats;
                beats += 1;
                if let Err(e) = guarded(handler.on_heartbeat(count)).await {
                    error!(agent = %name, count, error = %e, "Heartbeat handler failed");
                }
                gate.busy.store(false, Ordering::Release);
            }
            AgentMessage::Stop => {
                if let Err(e) = guarded(handler.on_stop()).await {
                    error!(agent = %name, error = %e, "Agent stop handler failed");
                }
                let _ = tx.send(AgentMessage::Close);
            }
            AgentMessage::Close => break,
        }
    }

    drop(rx);
    finished.send_replace(true);
    info!(agent = %name, "Agent stopped");
}

async fn heartbeat_timer<H: AgentHandler>(
    name: Arc<str>,
    period: Duration,
    tx: mpsc::UnboundedSender<AgentMessage<H>>,
    gate: Arc<HeartbeatGate>,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if gate.busy.swap(true, Ordering::AcqRel) {
            let blocked = gate.blocked.fetch_add(1, Ordering::Relaxed) + 1;
            gate.skipped.fetch_add(1, Ordering::Relaxed);
            warn!(agent = %name, blocked, "Heartbeat blocked for {blocked} count");
            continue;
        }
        if tx.send(AgentMessage::Heartbeat).is_err() {
            break;
        }
    }
}

async fn guarded<F>(future: F) -> Result<(), AgentError>
where
    F: Future<Output = Result<(), AgentError>>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(AgentError::from_panic(payload)))
}
