//! Hook composition: user-supplied wrappers around generated entity
//! operations. Operations are plain function values; wrapping produces a new
//! function value that receives the original plus the call's arguments, so
//! composition stacks left-to-right and errors propagate unchanged.

use crate::entity::{DeleteOptions, FindOptions, InsertOptions, SaveOptions, UpdateManyOptions};
use crate::error::Result;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A bound entity operation: owned arguments in, rows out.
pub type OpFn<Args, Out> = Arc<dyn Fn(Args) -> BoxFuture<Result<Out>> + Send + Sync>;

/// A wrapper around an operation. Receives the original function and the
/// call's arguments; calling through is the hook's responsibility.
pub type OpHook<Args, Out> = Arc<dyn Fn(OpFn<Args, Out>, Args) -> BoxFuture<Result<Out>> + Send + Sync>;

pub type FindFn = OpFn<FindOptions, Vec<Value>>;
pub type FindHook = OpHook<FindOptions, Vec<Value>>;
pub type InsertFn = OpFn<InsertOptions, Vec<Value>>;
pub type InsertHook = OpHook<InsertOptions, Vec<Value>>;
pub type SaveFn = OpFn<SaveOptions, Value>;
pub type SaveHook = OpHook<SaveOptions, Value>;
pub type DeleteFn = OpFn<DeleteOptions, Vec<Value>>;
pub type DeleteHook = OpHook<DeleteOptions, Vec<Value>>;
pub type UpdateManyFn = OpFn<UpdateManyOptions, Vec<Value>>;
pub type UpdateManyHook = OpHook<UpdateManyOptions, Vec<Value>>;

/// Wrap `original` with `hook`: the new function forwards its arguments to
/// the hook along with the original. Stateless and reusable.
pub fn wrap<Args, Out>(original: OpFn<Args, Out>, hook: OpHook<Args, Out>) -> OpFn<Args, Out>
where
    Args: 'static,
    Out: 'static,
{
    Arc::new(move |args| hook(original.clone(), args))
}

/// Wrappers for one entity's operations. Absent entries leave the operation
/// untouched. `count` is not part of the hookable surface.
#[derive(Clone, Default)]
pub struct EntityHooks {
    pub find: Option<FindHook>,
    pub insert: Option<InsertHook>,
    pub save: Option<SaveHook>,
    pub delete: Option<DeleteHook>,
    pub update_many: Option<UpdateManyHook>,
}

/// Box an async closure as a `find` hook.
pub fn find_hook<F, Fut>(f: F) -> FindHook
where
    F: Fn(FindFn, FindOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Value>>> + Send + 'static,
{
    Arc::new(move |original, opts| Box::pin(f(original, opts)))
}

/// Box an async closure as an `insert` hook.
pub fn insert_hook<F, Fut>(f: F) -> InsertHook
where
    F: Fn(InsertFn, InsertOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Value>>> + Send + 'static,
{
    Arc::new(move |original, opts| Box::pin(f(original, opts)))
}

/// Box an async closure as a `save` hook.
pub fn save_hook<F, Fut>(f: F) -> SaveHook
where
    F: Fn(SaveFn, SaveOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |original, opts| Box::pin(f(original, opts)))
}

/// Box an async closure as a `delete` hook.
pub fn delete_hook<F, Fut>(f: F) -> DeleteHook
where
    F: Fn(DeleteFn, DeleteOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Value>>> + Send + 'static,
{
    Arc::new(move |original, opts| Box::pin(f(original, opts)))
}

/// Box an async closure as an `update_many` hook.
pub fn update_many_hook<F, Fut>(f: F) -> UpdateManyHook
where
    F: Fn(UpdateManyFn, UpdateManyOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Value>>> + Send + 'static,
{
    Arc::new(move |original, opts| Box::pin(f(original, opts)))
}

/// One operation's current function value. Written only by hook application
/// (single writer, established at connect time); reads clone the Arc out so
/// no lock is held across the call.
pub(crate) struct OpSlot<Args, Out> {
    inner: RwLock<OpFn<Args, Out>>,
}

impl<Args: 'static, Out: 'static> OpSlot<Args, Out> {
    pub(crate) fn new(f: OpFn<Args, Out>) -> Self {
        OpSlot {
            inner: RwLock::new(f),
        }
    }

    pub(crate) fn get(&self) -> OpFn<Args, Out> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current function with `wrap(current, hook)`.
    pub(crate) fn compose(&self, hook: OpHook<Args, Out>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let original = guard.clone();
        *guard = wrap(original, hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base() -> OpFn<u32, u32> {
        Arc::new(|n| Box::pin(async move { Ok(n + 1) }))
    }

    #[tokio::test]
    async fn wrapped_function_calls_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let hook: OpHook<u32, u32> = Arc::new(move |original, n| {
            seen.fetch_add(1, Ordering::SeqCst);
            original(n)
        });
        let wrapped = wrap(base(), hook);
        assert_eq!(wrapped(1).await.unwrap(), 2);
        assert_eq!(wrapped(5).await.unwrap(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn composition_is_left_to_right() {
        let slot = OpSlot::new(base());
        let first: OpHook<u32, u32> = Arc::new(|original, n| {
            Box::pin(async move { Ok(original(n).await? * 10) })
        });
        let second: OpHook<u32, u32> = Arc::new(|original, n| {
            Box::pin(async move { Ok(original(n).await? + 3) })
        });
        slot.compose(first);
        slot.compose(second);
        // second wraps the result of the first: ((1 + 1) * 10) + 3
        assert_eq!(slot.get()(1).await.unwrap(), 23);
    }

    #[tokio::test]
    async fn hook_errors_propagate_unchanged() {
        let hook: OpHook<u32, u32> = Arc::new(|_original, _n| {
            Box::pin(async { Err(crate::error::MapperError::ConnectionClosed) })
        });
        let wrapped = wrap(base(), hook);
        assert!(matches!(
            wrapped(1).await,
            Err(crate::error::MapperError::ConnectionClosed)
        ));
    }
}
