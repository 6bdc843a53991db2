//! Allows extracting the shared app state.

use async_trait::async_trait;
use derive_more::{Deref, DerefMut};

use crate::extract::{Extract, TaskContext};
use std::convert::Infallible;

/// Extracts the app state registered at [`crate::app::WorkerApp::new`].
///
/// Unlike the teacher's multi-type `AnyMap` state, `taskq` has exactly one state
/// value per app, so extraction can never fail: it is always present once the app
/// has been built.
#[derive(Debug, Deref, DerefMut)]
pub struct State<T>(pub std::sync::Arc<T>);

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[async_trait]
impl<T> Extract<T> for State<T>
where
    T: Send + Sync + 'static,
{
    type Error = Infallible;

    async fn extract(ctx: &TaskContext<T>) -> Result<Self, Self::Error> {
        Ok(State(ctx.state()))
    }
}
