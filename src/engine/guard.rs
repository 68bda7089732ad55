//! Scoped operations: the engine always hears about the end of the work.
//!
//! [`LoadingGuard`] stops its operation when dropped, which covers normal
//! return, `?` early exits, panics, and futures dropped mid-flight. The
//! `run_with_loading*` wrappers are built on it.

use std::future::Future;

use tracing::Instrument;

use crate::model::{OperationPatch, StartOptions, Token};
use crate::telemetry::loading::{operation_span, record_outcome};

use super::LoadingEngine;

/// Cloneable handle for updating one live operation.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    engine: LoadingEngine,
    token: Token,
}

impl OperationHandle {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn update(&self, patch: OperationPatch) -> bool {
        self.engine.update(self.token, patch)
    }

    pub fn set_message(&self, message: impl Into<String>) -> bool {
        self.update(OperationPatch::new().message(message))
    }

    pub fn set_progress(&self, current: i64, total: i64) -> bool {
        self.update(OperationPatch::new().progress(current, total))
    }
}

/// Stops its operation on drop.
#[derive(Debug)]
pub struct LoadingGuard {
    handle: OperationHandle,
    stopped: bool,
}

impl LoadingGuard {
    pub fn token(&self) -> Token {
        self.handle.token
    }

    pub fn handle(&self) -> OperationHandle {
        self.handle.clone()
    }

    pub fn update(&self, patch: OperationPatch) -> bool {
        self.handle.update(patch)
    }

    /// Stop now instead of at drop. Returns what `stop` returned.
    pub fn finish(mut self) -> bool {
        self.stop()
    }

    fn stop(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        self.handle.engine.stop(self.handle.token)
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LoadingEngine {
    /// Start an operation that stops when the returned guard is dropped.
    pub fn guard(&self, options: StartOptions) -> LoadingGuard {
        let token = self.start(options);
        LoadingGuard {
            handle: OperationHandle {
                engine: self.clone(),
                token,
            },
            stopped: false,
        }
    }

    /// Show loading for the duration of `future`.
    ///
    /// The operation is stopped before the output is returned, whatever it
    /// is. Errors pass through untouched. Dropping the returned future
    /// stops the operation too, but does not cancel anything `future` started.
    pub async fn run_with_loading<F>(&self, options: StartOptions, future: F) -> F::Output
    where
        F: Future,
    {
        self.run_with_handle(options, |_| future).await
    }

    /// Like [`run_with_loading`](Self::run_with_loading), but the work gets
    /// an [`OperationHandle`] so it can report progress as it goes.
    pub async fn run_with_handle<F, Fut>(&self, options: StartOptions, work: F) -> Fut::Output
    where
        F: FnOnce(OperationHandle) -> Fut,
        Fut: Future,
    {
        let scope = options.scope;
        let guard = self.guard(options);
        let span = operation_span(scope, guard.token());

        let output = work(guard.handle()).instrument(span.clone()).await;

        record_outcome(&span, self.is_revealed());
        drop(guard);
        output
    }

    /// Synchronous counterpart of [`run_with_loading`](Self::run_with_loading).
    pub fn run_with_loading_sync<T>(&self, options: StartOptions, work: impl FnOnce() -> T) -> T {
        let scope = options.scope;
        let guard = self.guard(options);
        let span = operation_span(scope, guard.token());

        let output = span.in_scope(work);

        record_outcome(&span, self.is_revealed());
        drop(guard);
        output
    }
}
