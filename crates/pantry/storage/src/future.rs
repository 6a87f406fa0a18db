//! Single-fire deferred results.
//!
//! A [`StoreFuture`] does nothing until it is polled (awaited or subscribed), resolves
//! exactly once, and short-circuits on the first failure of a chain. There is no
//! cancellation hook: a subscribed chain always runs to its terminal callback.

use crate::{StorageError, StorageResult};
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct StoreFuture<T> {
    inner: BoxFuture<'static, StorageResult<T>>,
}

impl<T: Send + 'static> StoreFuture<T> {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// A future whose result is already known.
    pub fn ready(result: StorageResult<T>) -> Self {
        Self::new(futures::future::ready(result))
    }

    pub fn success(value: T) -> Self {
        Self::ready(Ok(value))
    }

    pub fn failure(error: StorageError) -> Self {
        Self::ready(Err(error))
    }

    /// Build a future from a start function that reports through a [`Resolver`].
    ///
    /// `start` runs once, on first poll. A resolver dropped without resolving fails the
    /// future with [`StorageError::NoResult`].
    pub fn from_callback<F>(start: F) -> Self
    where
        F: FnOnce(Resolver<T>) + Send + 'static,
    {
        Self::new(async move {
            let (sender, receiver) = oneshot::channel();
            start(Resolver { sender });
            receiver.await.unwrap_or_else(|_| {
                Err(StorageError::NoResult(
                    "resolver dropped before completion".to_string(),
                ))
            })
        })
    }

    pub fn map<U, F>(self, f: F) -> StoreFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        StoreFuture::new(async move { self.inner.await.map(f) })
    }

    /// Map a success through a fallible step; an `Err` from `f` becomes the failure.
    pub fn transform<U, F>(self, f: F) -> StoreFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> StorageResult<U> + Send + 'static,
    {
        StoreFuture::new(async move { f(self.inner.await?) })
    }

    /// Sequence a dependent asynchronous step.
    pub fn then<U, F>(self, f: F) -> StoreFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> StoreFuture<U> + Send + 'static,
    {
        StoreFuture::new(async move {
            let value = self.inner.await?;
            f(value).await
        })
    }

    /// Start the computation on the current tokio runtime and deliver exactly one callback.
    ///
    /// Outside a runtime nothing is spawned: `on_failure` receives `NoResponse` right
    /// away and `None` is returned.
    pub fn subscribe<S, E>(self, on_success: S, on_failure: E) -> Option<JoinHandle<()>>
    where
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(StorageError) + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                on_failure(StorageError::NoResponse(format!(
                    "subscribed outside a tokio runtime: {error}"
                )));
                return None;
            }
        };
        Some(runtime.spawn(async move {
            match self.await {
                Ok(value) => on_success(value),
                Err(error) => on_failure(error),
            }
        }))
    }

    /// Run futures one after another, collecting results in input order.
    ///
    /// Each future starts only after the previous one succeeded; the first failure ends
    /// the batch.
    pub fn batch<I>(futures: I) -> StoreFuture<Vec<T>>
    where
        I: IntoIterator<Item = StoreFuture<T>>,
    {
        let futures: Vec<StoreFuture<T>> = futures.into_iter().collect();
        StoreFuture::new(async move {
            let mut values = Vec::with_capacity(futures.len());
            for future in futures {
                values.push(future.await?);
            }
            Ok(values)
        })
    }
}

impl<T> Future for StoreFuture<T> {
    type Output = StorageResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for StoreFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreFuture").finish_non_exhaustive()
    }
}

/// One-shot completion handle passed to [`StoreFuture::from_callback`].
pub struct Resolver<T> {
    sender: oneshot::Sender<StorageResult<T>>,
}

impl<T> Resolver<T> {
    pub fn resolve(self, result: StorageResult<T>) {
        // The receiver only disappears when the future itself was dropped.
        let _ = self.sender.send(result);
    }

    pub fn succeed(self, value: T) {
        self.resolve(Ok(value));
    }

    pub fn fail(self, error: StorageError) {
        self.resolve(Err(error));
    }
}
