//! # Host runtime seam.
//!
//! Everything the supervised task set needs from the platform goes through [`Host`]:
//! the tick clock, task creation, heap telemetry, the transient scratch allocation
//! used by the consumer, stack headroom and the device-restart primitive.
//!
//! ```text
//!   Producer ─┐                       ┌─► now()            (monotonic ticks)
//!   Consumer ─┼──► Context ──► Host ──┼─► spawn(kind, fut) (task creation)
//! Supervisor ─┘                       ├─► heap() / alloc_scratch()
//!                                     ├─► stack_headroom(kind)
//!                                     └─► restart_device(reason)
//! ```
//!
//! [`SimHost`] is the tokio-backed implementation used by the demo and the tests.

mod sim;

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::channel::Message;
use crate::core::RestartReason;
use crate::error::TaskError;
use crate::tasks::{BoxTaskFuture, TaskKind};

pub use sim::SimHost;

/// Monotonic host ticks (milliseconds since host boot).
pub type Tick = u64;

/// Join handle of a task created through [`Host::spawn`].
pub type TaskJoin = JoinHandle<Result<(), TaskError>>;

/// Converts a duration into host ticks, saturating.
#[inline]
pub fn ticks(d: Duration) -> Tick {
    d.as_millis().min(u128::from(Tick::MAX)) as Tick
}

/// Heap telemetry snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Currently free bytes.
    pub free: usize,
    /// Lowest free byte count observed since boot.
    pub min_free: usize,
}

/// Scratch allocation sized to hold one message.
///
/// Allocated fallibly; dropping it frees the memory.
#[derive(Debug)]
pub struct ScratchCell {
    slot: Vec<Message>,
}

impl ScratchCell {
    /// Allocates a cell on the global allocator without aborting on failure.
    pub fn try_new() -> Result<Self, AllocError> {
        let mut slot = Vec::new();
        slot.try_reserve_exact(1).map_err(|_| AllocError {
            bytes: size_of::<Message>(),
        })?;
        Ok(Self { slot })
    }

    /// Stores a value, replacing the previous one.
    pub fn store(&mut self, value: Message) {
        self.slot.clear();
        self.slot.push(value);
    }

    /// Returns the stored value.
    pub fn load(&self) -> Option<Message> {
        self.slot.first().copied()
    }
}

/// Scratch allocation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("allocation of {bytes} bytes failed")]
pub struct AllocError {
    /// Requested size.
    pub bytes: usize,
}

/// Task creation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to create task {task}: {reason}")]
pub struct SpawnError {
    /// Kind of the task that could not be created.
    pub task: TaskKind,
    /// Host-specific detail.
    pub reason: String,
}

/// Platform services consumed by the task set.
///
/// Implementations must be cheap to call from every task iteration.
pub trait Host: Send + Sync + 'static {
    /// Current monotonic tick.
    fn now(&self) -> Tick;

    /// Creates a task running `fut`.
    ///
    /// Dropping the returned handle detaches the task; aborting it destroys the task.
    fn spawn(&self, kind: TaskKind, fut: BoxTaskFuture) -> Result<TaskJoin, SpawnError>;

    /// Current heap telemetry.
    fn heap(&self) -> HeapStats;

    /// Allocates the consumer's transient scratch cell.
    fn alloc_scratch(&self) -> Result<ScratchCell, AllocError> {
        ScratchCell::try_new()
    }

    /// Remaining stack headroom (words) of a task, when the host can measure it.
    fn stack_headroom(&self, _kind: TaskKind) -> Option<usize> {
        None
    }

    /// Irreversible full-device restart.
    ///
    /// Called once, right before the runtime tears the task set down.
    fn restart_device(&self, reason: &RestartReason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_milliseconds() {
        assert_eq!(ticks(Duration::from_millis(1500)), 1500);
        assert_eq!(ticks(Duration::from_secs(5)), 5000);
        assert_eq!(ticks(Duration::MAX), Tick::MAX);
    }

    #[test]
    fn test_scratch_cell_holds_one_value() {
        let mut cell = ScratchCell::try_new().expect("tiny allocation");
        assert_eq!(cell.load(), None);
        cell.store(7);
        cell.store(8);
        assert_eq!(cell.load(), Some(8));
    }
}
