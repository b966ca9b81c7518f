//! Type-erased mailbox jobs.

use super::{AgentError, AgentHandler};
use futures::future::BoxFuture;

/// Synchronous action posted with [`MicroAgent::post_action`](super::MicroAgent::post_action).
pub type ActionFn<H, T> = fn(&mut H, T) -> Result<(), AgentError>;

/// Asynchronous action posted with [`MicroAgent::post_task`](super::MicroAgent::post_task).
pub type TaskFn<H, T> = for<'a> fn(&'a mut H, T) -> BoxFuture<'a, Result<(), AgentError>>;

/// A posted action with its argument.
pub(crate) trait ErasedJob<H>: Send {
    fn run<'a>(self: Box<Self>, handler: &'a mut H) -> BoxFuture<'a, Result<(), AgentError>>;
}

pub(crate) struct Action<H, T> {
    pub(crate) arg: T,
    pub(crate) action: ActionFn<H, T>,
}

impl<H: AgentHandler, T: Send + 'static> ErasedJob<H> for Action<H, T> {
    fn run<'a>(self: Box<Self>, handler: &'a mut H) -> BoxFuture<'a, Result<(), AgentError>> {
        Box::pin(async move { (self.action)(handler, self.arg) })
    }
}

pub(crate) struct Task<H, T> {
    pub(crate) arg: T,
    pub(crate) task: TaskFn<H, T>,
}

impl<H: AgentHandler, T: Send + 'static> ErasedJob<H> for Task<H, T> {
    fn run<'a>(self: Box<Self>, handler: &'a mut H) -> BoxFuture<'a, Result<(), AgentError>> {
        Box::pin(async move { (self.task)(handler, self.arg).await })
    }
}

/// Mailbox message.
pub(crate) enum AgentMessage<H: AgentHandler> {
    Erased(Box<dyn ErasedJob<H>>),
    Typed(H::Job),
    Heartbeat,
    Stop,
    Close,
}
