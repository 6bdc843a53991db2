//! [`Handler`]s are functions whose arguments can be extracted from a task's context.

use std::clone::Clone;
use std::future::Future;

use async_trait::async_trait;

use crate::codec::Encode;
use crate::error::SerializedFailure;
use crate::extract::{Extract, TaskContext};

/// A trait for functions that can be used as handlers for incoming tasks.
///
/// The trait implementations on functions of different arities allow handlers to
/// have (almost) any number of parameters, each of which must implement [`Extract`].
#[async_trait]
pub trait Handler<Args, Res, S>: Send + 'static + Clone
where
    Res: Encode,
{
    /// Calls the handler with the given task context, producing the encoded output
    /// payload, or a serialized description of why it couldn't be produced.
    async fn call(self, ctx: &TaskContext<S>) -> Result<Vec<u8>, SerializedFailure>;
}

/// Special-case the 0-args case to avoid unused variable warnings.
#[async_trait]
impl<Func, Fut, Res, S> Handler<(), Res, S> for Func
where
    Func: FnOnce() -> Fut + Send + 'static + Clone,
    Fut: Future<Output = Res> + Send,
    Res: Encode,
    S: Send + Sync,
{
    async fn call(self, _ctx: &TaskContext<S>) -> Result<Vec<u8>, SerializedFailure> {
        self().await.encode().map_err(|e| SerializedFailure::from_codec_error(&e))
    }
}

/// Implements the handler trait for any number of extractor parameters.
macro_rules! impl_handler {
    ( $($ty:ident),* $(,)? ) => {
        #[allow(non_snake_case)]
        #[async_trait]
        impl<Func, Fut, Res, S, $($ty,)*> Handler<($($ty,)*), Res, S> for Func
        where
            Func: FnOnce($($ty,)*) -> Fut + Send + 'static + Clone,
            Fut: Future<Output = Res> + Send,
            Res: Encode,
            S: Send + Sync,
            $( $ty: Extract<S> + Send, )*
            $( $ty::Error: Into<crate::error::Error>, )*
        {
            async fn call(self, ctx: &TaskContext<S>) -> Result<Vec<u8>, SerializedFailure> {
                $(
                    let $ty = match $ty::extract(ctx).await {
                        Ok(value) => value,
                        Err(error) => {
                            let error = error.into();
                            tracing::error!("Failed to extract {}: {error}", std::any::type_name::<$ty>());
                            return Err(SerializedFailure::from_extract_error(&error));
                        }
                    };
                )*

                self($($ty,)*)
                    .await
                    .encode()
                    .map_err(|e| SerializedFailure::from_codec_error(&e))
            }
        }
    };
}

// Implement for up to 8 parameters; a task handler realistically needs at most the
// decoded input plus a couple of extras (state, task id).
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
