//! # Heartbeat registry: per-task liveness stamps.
//!
//! Each supervised task kind owns one slot holding its last-seen tick and a health flag.
//!
//! ## Architecture
//! ```text
//! Producer ──stamp/set_healthy──┐
//! Consumer ──stamp/set_healthy──┼──► HeartbeatRegistry ──► snapshot() ──► Supervisor / Logger
//! Supervisor ──stamp (own + on recreation)──┘
//! ```
//!
//! ## Rules
//! - Slots are written by their owning task; the supervisor additionally stamps a
//!   recreated task once, at recreation time.
//! - Stamps use `fetch_max`, so a slot's heartbeat never decreases.
//! - Reads are lock-free (`Acquire`), writes `Release`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::host::Tick;
use crate::tasks::TaskKind;

/// Point-in-time view of one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatSnapshot {
    /// Task kind.
    pub task: TaskKind,
    /// Last stamped tick.
    pub last_seen: Tick,
    /// Health flag as last written.
    pub healthy: bool,
}

#[derive(Debug, Default)]
struct Slot {
    last_seen: AtomicU64,
    healthy: AtomicBool,
}

/// Lock-free table of heartbeats, one slot per [`TaskKind`].
#[derive(Debug)]
pub struct HeartbeatRegistry {
    slots: [Slot; TaskKind::COUNT],
}

impl Default for HeartbeatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatRegistry {
    /// Creates a registry with every heartbeat at tick 0 and every flag unhealthy.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }

    /// Records that `task` was alive at `now`.
    #[inline]
    pub fn stamp(&self, task: TaskKind, now: Tick) {
        self.slots[task.index()]
            .last_seen
            .fetch_max(now, Ordering::Release);
    }

    /// Writes the health flag of `task`.
    #[inline]
    pub fn set_healthy(&self, task: TaskKind, healthy: bool) {
        self.slots[task.index()]
            .healthy
            .store(healthy, Ordering::Release);
    }

    /// Last stamped tick of `task`.
    #[inline]
    pub fn last_seen(&self, task: TaskKind) -> Tick {
        self.slots[task.index()].last_seen.load(Ordering::Acquire)
    }

    /// Health flag of `task`.
    #[inline]
    pub fn is_healthy(&self, task: TaskKind) -> bool {
        self.slots[task.index()].healthy.load(Ordering::Acquire)
    }

    /// Snapshot of a single slot.
    pub fn get(&self, task: TaskKind) -> HeartbeatSnapshot {
        HeartbeatSnapshot {
            task,
            last_seen: self.last_seen(task),
            healthy: self.is_healthy(task),
        }
    }

    /// Snapshots of the given kinds, in the given order.
    pub fn snapshot(&self, kinds: &[TaskKind]) -> Vec<HeartbeatSnapshot> {
        kinds.iter().map(|&k| self.get(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zeroed() {
        let reg = HeartbeatRegistry::new();
        for kind in TaskKind::ALL {
            assert_eq!(reg.last_seen(kind), 0);
            assert!(!reg.is_healthy(kind));
        }
    }

    #[test]
    fn test_stamp_never_goes_backwards() {
        let reg = HeartbeatRegistry::new();
        reg.stamp(TaskKind::Producer, 300);
        reg.stamp(TaskKind::Producer, 150);
        assert_eq!(reg.last_seen(TaskKind::Producer), 300);
        reg.stamp(TaskKind::Producer, 450);
        assert_eq!(reg.last_seen(TaskKind::Producer), 450);
    }

    #[test]
    fn test_slots_are_independent() {
        let reg = HeartbeatRegistry::new();
        reg.stamp(TaskKind::Consumer, 10);
        reg.set_healthy(TaskKind::Consumer, true);

        let snap = reg.snapshot(&[TaskKind::Producer, TaskKind::Consumer]);
        assert_eq!(
            snap,
            vec![
                HeartbeatSnapshot {
                    task: TaskKind::Producer,
                    last_seen: 0,
                    healthy: false
                },
                HeartbeatSnapshot {
                    task: TaskKind::Consumer,
                    last_seen: 10,
                    healthy: true
                },
            ]
        );
    }
}
