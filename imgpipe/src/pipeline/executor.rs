//! Executor abstraction for running blocking stage work.
//!
//! Download and decode block their thread for arbitrary durations, so the
//! dispatcher never runs them on the async runtime's worker threads. It
//! depends on [`BlockingExecutor`] instead of calling Tokio directly:
//!
//! ```text
//! ┌─────────────────────┐
//! │     Dispatcher      │  drive loop per request
//! └─────────┬───────────┘
//!           │ depends on
//!           ▼
//! ┌─────────────────────┐
//! │  BlockingExecutor   │
//! └─────────┬───────────┘
//!           │ implemented by
//!           ▼
//! ┌─────────────────────┐      ┌─────────────────────┐
//! │   TokioExecutor     │      │   InlineExecutor    │
//! │   spawn_blocking    │      │   current thread    │
//! └─────────────────────┘      └─────────────────────┘
//! ```

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`BlockingExecutor::execute_blocking`].
pub type BlockingFuture<R> = Pin<Box<dyn Future<Output = Result<R, ExecutorError>> + Send>>;

/// Runs blocking closures off the async runtime.
pub trait BlockingExecutor: Send + Sync + 'static {
    /// Executes `f` where it may block. A panic inside `f` is reported as
    /// [`ExecutorError::TaskPanicked`].
    fn execute_blocking<F, R>(&self, f: F) -> BlockingFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static;
}

/// Errors from executing a task.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("executor shut down")]
    Shutdown,
}

/// Production executor backed by `tokio::task::spawn_blocking`.
#[derive(Clone, Default)]
pub struct TokioExecutor;

impl TokioExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl BlockingExecutor for TokioExecutor {
    fn execute_blocking<F, R>(&self, f: F) -> BlockingFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        Box::pin(async move {
            tokio::task::spawn_blocking(f).await.map_err(|e| {
                if e.is_cancelled() {
                    ExecutorError::Shutdown
                } else {
                    ExecutorError::TaskPanicked(e.to_string())
                }
            })
        })
    }
}

/// Executes "blocking" work immediately on the calling thread.
///
/// Makes stage order deterministic in tests.
#[derive(Clone, Default)]
pub struct InlineExecutor;

impl BlockingExecutor for InlineExecutor {
    fn execute_blocking<F, R>(&self, f: F) -> BlockingFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let result = catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ExecutorError::TaskPanicked(msg)
        });
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_display() {
        let err = ExecutorError::TaskPanicked("oops".to_string());
        assert_eq!(format!("{}", err), "task panicked: oops");
        assert_eq!(ExecutorError::Shutdown.to_string(), "executor shut down");
    }

    #[tokio::test]
    async fn test_tokio_executor_blocking() {
        let executor = TokioExecutor::new();
        let result = executor.execute_blocking(|| 42).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_tokio_executor_reports_panic() {
        let executor = TokioExecutor::new();
        let result: Result<(), _> = executor.execute_blocking(|| panic!("decoder bug")).await;
        assert!(matches!(result, Err(ExecutorError::TaskPanicked(_))));
    }

    #[test]
    fn test_inline_executor_blocking() {
        // No runtime needed
        let executor = InlineExecutor;
        let result = futures::executor::block_on(executor.execute_blocking(|| 42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_inline_executor_reports_panic() {
        let executor = InlineExecutor;
        let result: Result<(), _> =
            futures::executor::block_on(executor.execute_blocking(|| panic!("boom")));
        match result {
            Err(ExecutorError::TaskPanicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected panic error, got {:?}", other),
        }
    }
}
