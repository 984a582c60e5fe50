//! # Device restart reasons and the one-shot restart latch.
//!
//! A device restart is the terminal recovery action. Any component may request it
//! through [`Context::restart_device`](crate::core::Context::restart_device); the
//! first request wins and the runtime tears everything down.
//!
//! ```text
//! Supervisor (memory policy) ──┐
//! Watchdog monitor (expiry)  ──┼──► RestartLatch::trip(reason) ──► Runtime::drive() ──► Err(DeviceRestart)
//! Runtime (supervisor exit)  ──┘
//! ```

use std::fmt;
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::tasks::TaskKind;

/// Boot step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootStage {
    /// Watchdog initialization.
    Watchdog,
    /// Channel creation.
    Channel,
    /// Creation of a core task.
    Task(TaskKind),
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootStage::Watchdog => f.write_str("watchdog"),
            BootStage::Channel => f.write_str("channel"),
            BootStage::Task(kind) => write!(f, "task {kind}"),
        }
    }
}

/// Why the device is being restarted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestartReason {
    /// A boot step failed before any supervision existed.
    BootFailure {
        /// Failed step.
        stage: BootStage,
    },
    /// The consumer kept being recreated while free heap stayed below the restart floor.
    MemoryExhausted {
        /// Consumer recreations so far.
        restarts: u32,
        /// Free heap at the decision.
        free_heap: usize,
    },
    /// Minimum-ever free heap fell below the absolute floor.
    CriticalHeapFloor {
        /// Minimum-ever free heap at the decision.
        min_free_heap: usize,
    },
    /// A registered task stopped feeding the watchdog.
    WatchdogExpired {
        /// First task found expired.
        task: TaskKind,
    },
    /// The supervisor task itself stopped.
    SupervisorExited,
}

impl RestartReason {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RestartReason::BootFailure { .. } => "boot_failure",
            RestartReason::MemoryExhausted { .. } => "memory_exhausted",
            RestartReason::CriticalHeapFloor { .. } => "critical_heap_floor",
            RestartReason::WatchdogExpired { .. } => "watchdog_expired",
            RestartReason::SupervisorExited => "supervisor_exited",
        }
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::BootFailure { stage } => write!(f, "boot failed at {stage}"),
            RestartReason::MemoryExhausted {
                restarts,
                free_heap,
            } => write!(
                f,
                "free heap {free_heap} bytes after {restarts} consumer restarts"
            ),
            RestartReason::CriticalHeapFloor { min_free_heap } => {
                write!(f, "minimum free heap {min_free_heap} bytes below floor")
            }
            RestartReason::WatchdogExpired { task } => write!(f, "watchdog expired for {task}"),
            RestartReason::SupervisorExited => f.write_str("supervisor task exited"),
        }
    }
}

/// One-shot latch recording the first restart request.
#[derive(Debug, Default)]
pub struct RestartLatch {
    reason: OnceLock<RestartReason>,
    token: CancellationToken,
}

impl RestartLatch {
    /// Creates an untripped latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` and wakes waiters. Returns `false` if already tripped.
    pub fn trip(&self, reason: RestartReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// The recorded reason, if tripped.
    pub fn reason(&self) -> Option<&RestartReason> {
        self.reason.get()
    }

    /// True once tripped.
    pub fn is_tripped(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Waits until the latch trips and returns the recorded reason.
    pub async fn tripped(&self) -> RestartReason {
        self.token.cancelled().await;
        // The reason is set before the token is cancelled.
        self.reason
            .get()
            .cloned()
            .unwrap_or(RestartReason::SupervisorExited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let latch = RestartLatch::new();
        assert!(!latch.is_tripped());
        assert!(latch.trip(RestartReason::CriticalHeapFloor { min_free_heap: 10 }));
        assert!(!latch.trip(RestartReason::SupervisorExited));
        assert_eq!(
            latch.tripped().await,
            RestartReason::CriticalHeapFloor { min_free_heap: 10 }
        );
    }

    #[test]
    fn test_display_mentions_stage() {
        let reason = RestartReason::BootFailure {
            stage: BootStage::Task(TaskKind::Consumer),
        };
        assert_eq!(reason.to_string(), "boot failed at task consumer");
        assert_eq!(reason.as_label(), "boot_failure");
    }
}
