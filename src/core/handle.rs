//! # Handle to a created task instance.
//!
//! The supervisor owns the handles of the workers it created; the runtime owns the
//! handles of the supervisor and the logger.
//!
//! ## Rules
//! - `destroy()` cancels and aborts: any in-flight channel operation is abandoned. It
//!   returns once the instance is gone, so its watchdog subscription is released before
//!   a replacement registers.
//! - `stop()` cancels and waits up to a grace period before aborting.
//! - `finished()` waits for the end of the instance without taking its result;
//!   `join()` takes the result.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::host::TaskJoin;
use crate::tasks::TaskKind;

/// How a task instance ended.
#[derive(Debug)]
pub enum TaskExit {
    /// Returned `Ok(())` (cancelled or finished).
    Completed,
    /// Returned an error.
    Failed(TaskError),
    /// Panicked.
    Panicked,
    /// Aborted by its owner.
    Aborted,
}

impl TaskExit {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            TaskExit::Completed => "completed".to_string(),
            TaskExit::Failed(e) => format!("{}: {e}", e.as_label()),
            TaskExit::Panicked => "panicked".to_string(),
            TaskExit::Aborted => "aborted".to_string(),
        }
    }
}

/// Exclusive handle to a running task.
#[derive(Debug)]
pub struct TaskHandle {
    kind: TaskKind,
    join: TaskJoin,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl TaskHandle {
    /// `done` must be cancelled when the task future is dropped (see [`watch`]).
    pub(crate) fn new(
        kind: TaskKind,
        join: TaskJoin,
        cancel: CancellationToken,
        done: CancellationToken,
    ) -> Self {
        Self {
            kind,
            join,
            cancel,
            done,
        }
    }

    /// Task kind.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// True once the task returned, panicked or was aborted.
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled() || self.join.is_finished()
    }

    /// Waits until the task future is gone. Does not consume the result.
    pub async fn finished(&self) {
        self.done.cancelled().await;
    }

    /// Destroys the task and waits until its future has been dropped.
    pub async fn destroy(self) -> TaskExit {
        self.cancel.cancel();
        self.join.abort();
        self.join().await
    }

    /// Waits for the task to end.
    pub async fn join(self) -> TaskExit {
        match self.join.await {
            Ok(Ok(())) => TaskExit::Completed,
            Ok(Err(e)) => TaskExit::Failed(e),
            Err(je) if je.is_panic() => TaskExit::Panicked,
            Err(_) => TaskExit::Aborted,
        }
    }

    /// Cancels the task and waits up to `grace`; aborts it if it does not stop in time.
    ///
    /// Returns `true` if the task stopped on its own.
    pub async fn stop(mut self, grace: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => true,
            Err(_) => {
                self.join.abort();
                false
            }
        }
    }
}

/// Wraps a task future so that `done` is cancelled when it is dropped, whether it
/// completed, panicked or was aborted.
pub(crate) fn watch<F>(fut: F, done: CancellationToken) -> impl Future<Output = F::Output>
where
    F: Future,
{
    async move {
        let _done = done.drop_guard();
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(fut: impl Future<Output = Result<(), TaskError>> + Send + 'static) -> TaskHandle {
        spawn_with(fut, CancellationToken::new())
    }

    fn spawn_with(
        fut: impl Future<Output = Result<(), TaskError>> + Send + 'static,
        token: CancellationToken,
    ) -> TaskHandle {
        let done = CancellationToken::new();
        let join = tokio::spawn(watch(fut, done.clone()));
        TaskHandle::new(TaskKind::Consumer, join, token, done)
    }

    #[tokio::test]
    async fn test_join_reports_failure() {
        let h = spawn(async {
            Err(TaskError::Fail {
                error: "gave up".into(),
            })
        });
        let exit = h.join().await;
        assert_eq!(exit.describe(), "task_failed: execution failed: gave up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_cooperative_task() {
        let token = CancellationToken::new();
        let child = token.clone();
        let h = spawn_with(
            async move {
                child.cancelled().await;
                Ok(())
            },
            token,
        );
        assert!(h.stop(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_stuck_task() {
        let h = spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        assert!(!h.stop(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_destroy_drops_the_future() {
        let h = spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let token = h.cancel.clone();
        let done = h.done.clone();
        assert!(!h.is_finished());

        assert!(matches!(h.destroy().await, TaskExit::Aborted));
        assert!(token.is_cancelled());
        assert!(done.is_cancelled());
    }

    #[tokio::test]
    async fn test_finished_keeps_the_result() {
        let h = spawn(async {
            Err(TaskError::Fatal {
                error: "oom".into(),
            })
        });
        h.finished().await;
        assert!(h.is_finished());
        assert!(matches!(h.join().await, TaskExit::Failed(e) if e.is_fatal()));
    }
}
