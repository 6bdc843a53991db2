//! The [`WorkerApp`] builder: registers task handlers before the runtime is started.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::codec::Encode;
use crate::error::SerializedFailure;
use crate::extract::TaskContext;
use crate::handler::Handler;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased handler entry: decodes, invokes and encodes entirely inside the
/// boxed future, so the dispatch loop only ever deals with `TaskContext` in and
/// `Result<Vec<u8>, SerializedFailure>` out.
pub(crate) struct TaskFactory<S> {
    call: Box<dyn Fn(TaskContext<S>) -> BoxFuture<'static, Result<Vec<u8>, SerializedFailure>> + Send + Sync>,
}

impl<S> TaskFactory<S>
where
    S: Send + Sync + 'static,
{
    fn new<H, Args, Res>(handler: H) -> Self
    where
        H: Handler<Args, Res, S> + Sync,
        Args: Send + 'static,
        Res: Encode + Send + 'static,
    {
        Self {
            call: Box::new(move |ctx: TaskContext<S>| {
                let handler = handler.clone();
                Box::pin(async move { handler.call(&ctx).await })
            }),
        }
    }

    pub(crate) async fn call(&self, ctx: TaskContext<S>) -> Result<Vec<u8>, SerializedFailure> {
        (self.call)(ctx).await
    }
}

/// The central struct of a worker application: a set of task-kind handlers and a
/// shared state value they may extract via [`crate::extract::State`].
#[must_use = "call `.entrypoint()` (via `crate::runtime`) to actually run the app"]
pub struct WorkerApp<S> {
    pub(crate) handlers: HashMap<String, TaskFactory<S>>,
    pub(crate) state: Arc<S>,
}

impl<S> WorkerApp<S>
where
    S: Send + Sync + 'static,
{
    /// Creates a new app with the given shared state.
    pub fn new(state: S) -> Self {
        Self {
            handlers: HashMap::new(),
            state: Arc::new(state),
        }
    }

    /// Registers `handler` for `task_kind`.
    ///
    /// A later call with the same `task_kind` silently replaces the earlier
    /// registration; no error is raised (see data model invariant 5).
    pub fn task<H, Args, Res>(mut self, task_kind: impl Into<String>, handler: H) -> Self
    where
        H: Handler<Args, Res, S> + Sync,
        Args: Send + 'static,
        Res: Encode + Send + 'static,
    {
        let task_kind = task_kind.into();
        debug!("Registering handler {} for task kind {task_kind:?}", std::any::type_name::<H>());
        self.handlers.insert(task_kind, TaskFactory::new(handler));
        self
    }
}
