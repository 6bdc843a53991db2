//! Allows extracting a task's decoded input payload.

use async_trait::async_trait;
use derive_more::{Deref, DerefMut};

use crate::codec::Decode;
use crate::error::Error;
use crate::extract::{Extract, TaskContext};

/// Wraps a task's input payload, decoded via whichever [`Decode`] implementation `T`
/// provides. This is the extractor a handler uses to receive its typed argument; the
/// codec is selected at compile time by `T`, not looked up at runtime.
#[derive(Debug, Deref, DerefMut)]
pub struct Input<T>(pub T);

#[async_trait]
impl<S, T> Extract<S> for Input<T>
where
    T: Decode,
    S: Send + Sync,
{
    type Error = Error;

    async fn extract(ctx: &TaskContext<S>) -> Result<Self, Self::Error> {
        Ok(Input(T::decode(ctx.input_data())?))
    }
}
