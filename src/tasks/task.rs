//! # Task abstraction and the fixed task set.
//!
//! [`TaskKind`] names the foreknown tasks and their fixed priorities. [`Task`] is the
//! seam the supervisor uses to (re)create a worker: every call to [`Task::spawn`]
//! builds a **fresh** future that owns its own state, so a recreated instance always
//! starts from scratch (counter at zero, new heartbeat sequence).
//!
//! A task receives a [`CancellationToken`] and should check it at every suspension
//! point to stop cooperatively during shutdown.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Future returned by [`Task::spawn`].
pub type BoxTaskFuture = BoxFuture<'static, Result<(), TaskError>>;

/// Shared handle to a task factory.
pub type TaskRef = Arc<dyn Task>;

/// The foreknown task set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// Generates the value sequence.
    Producer,
    /// Receives and transmits values; runs the escalation ladder.
    Consumer,
    /// Watches heartbeats and recreates workers.
    Supervisor,
    /// Optional periodic heartbeat report.
    Logger,
}

impl TaskKind {
    /// Number of task kinds.
    pub const COUNT: usize = 4;

    /// Every kind, in priority order.
    pub const ALL: [TaskKind; Self::COUNT] = [
        TaskKind::Producer,
        TaskKind::Consumer,
        TaskKind::Supervisor,
        TaskKind::Logger,
    ];

    /// Kinds whose heartbeats are reported.
    pub const HEARTBEATS: [TaskKind; 3] =
        [TaskKind::Producer, TaskKind::Consumer, TaskKind::Supervisor];

    /// Kinds the supervisor recreates.
    pub const WORKERS: [TaskKind; 2] = [TaskKind::Producer, TaskKind::Consumer];

    /// Dense index for per-kind tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            TaskKind::Producer => "producer",
            TaskKind::Consumer => "consumer",
            TaskKind::Supervisor => "supervisor",
            TaskKind::Logger => "logger",
        }
    }

    /// Fixed priority (higher preempts lower): producer > consumer > supervisor > logger.
    pub const fn priority(self) -> u8 {
        match self {
            TaskKind::Producer => 6,
            TaskKind::Consumer => 5,
            TaskKind::Supervisor => 4,
            TaskKind::Logger => 2,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// # Re-creatable, cancelable unit.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use rtvisor::{BoxTaskFuture, Task, TaskKind};
///
/// struct Idle;
///
/// impl Task for Idle {
///     fn kind(&self) -> TaskKind { TaskKind::Logger }
///
///     fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture {
///         Box::pin(async move {
///             ctx.cancelled().await;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Which member of the task set this is.
    fn kind(&self) -> TaskKind;

    /// Builds a fresh instance.
    ///
    /// Implementations should return `Ok(())` promptly once `ctx` is cancelled.
    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture;
}
