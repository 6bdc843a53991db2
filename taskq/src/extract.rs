//! Interface for types that can extract themselves from a [`TaskContext`].

mod input;
mod state;

pub use input::Input;
pub use state::State;

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{TaskId, TaskKind, WorkerKind};

/// The context a handler's arguments are extracted from: the task's raw payload plus
/// everything the runtime knows about the delivery that carried it.
///
/// Unlike the broker delivery itself, a `TaskContext` carries no acknowledgment
/// handle — the execution state machine (see `crate::runtime`) owns ack/nack
/// exclusively, so handlers cannot observe or interfere with it.
pub struct TaskContext<S> {
    state: Arc<S>,
    id: TaskId,
    task_kind: TaskKind,
    worker_kind: WorkerKind,
    input_data: Vec<u8>,
}

impl<S> TaskContext<S> {
    /// Builds a new context from an assignment's fields and the shared app state.
    pub fn new(
        state: Arc<S>,
        id: TaskId,
        task_kind: TaskKind,
        worker_kind: WorkerKind,
        input_data: Vec<u8>,
    ) -> Self {
        Self {
            state,
            id,
            task_kind,
            worker_kind,
            input_data,
        }
    }

    /// The task's identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task kind that selected this handler.
    pub fn task_kind(&self) -> &str {
        &self.task_kind
    }

    /// The worker kind this task was routed to.
    pub fn worker_kind(&self) -> &str {
        &self.worker_kind
    }

    /// The raw, not-yet-decoded input payload.
    pub fn input_data(&self) -> &[u8] {
        &self.input_data
    }

    /// Returns a clone of the shared app state.
    pub fn state(&self) -> Arc<S> {
        self.state.clone()
    }
}

/// A trait for types that can be extracted from a [`TaskContext`].
///
/// Extraction never mutates the context: the same context may be used to extract
/// more than one argument for the same handler call.
#[async_trait]
pub trait Extract<S>: Sized {
    /// The error to return in case extraction fails.
    type Error: std::error::Error;

    /// Extracts `Self` from the given task context.
    async fn extract(ctx: &TaskContext<S>) -> Result<Self, Self::Error>;
}

/// The task's identifier, extractable on its own when a handler only needs it for
/// logging or idempotency keys and not for the full input payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentTaskId(pub Uuid);

#[async_trait]
impl<S> Extract<S> for CurrentTaskId
where
    S: Send + Sync,
{
    type Error = Infallible;

    async fn extract(ctx: &TaskContext<S>) -> Result<Self, Self::Error> {
        Ok(CurrentTaskId(ctx.id()))
    }
}

/// Extracting an `Option<T>` discards the extraction error and yields `None` instead.
#[async_trait]
impl<S, T> Extract<S> for Option<T>
where
    T: Extract<S>,
    S: Send + Sync,
{
    type Error = Infallible;

    async fn extract(ctx: &TaskContext<S>) -> Result<Self, Self::Error> {
        Ok(T::extract(ctx).await.ok())
    }
}
