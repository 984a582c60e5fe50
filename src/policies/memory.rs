//! # Heap pressure thresholds.
//!
//! [`MemoryPolicy`] holds the three heap floors used by the task set:
//! - `low_warn`: consumer-side observability only;
//! - `restart_floor` + `restart_limit`: device restart once the consumer has been
//!   recreated `restart_limit` times and free heap is still below the floor;
//! - `critical_floor`: device restart whenever the minimum-ever free heap drops below it.

use crate::core::RestartReason;
use crate::host::HeapStats;

/// Heap floors and the restart-count trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryPolicy {
    /// Free heap (bytes) under which the consumer reports low memory.
    pub low_warn: usize,
    /// Free heap (bytes) under which repeated recreation escalates to a device restart.
    pub restart_floor: usize,
    /// Consumer recreations required before `restart_floor` applies.
    pub restart_limit: u32,
    /// Minimum-ever free heap (bytes) under which the device restarts unconditionally.
    pub critical_floor: usize,
}

impl Default for MemoryPolicy {
    /// Returns 20 KiB / 16 KiB after 3 restarts / 8 KiB.
    fn default() -> Self {
        Self {
            low_warn: 20 * 1024,
            restart_floor: 16 * 1024,
            restart_limit: 3,
            critical_floor: 8 * 1024,
        }
    }
}

impl MemoryPolicy {
    /// True when the consumer should report low memory.
    #[inline]
    pub fn is_low(&self, heap: HeapStats) -> bool {
        heap.free < self.low_warn
    }

    /// Decides whether the device must restart.
    ///
    /// The restart-count path is checked first, then the absolute floor.
    pub fn evaluate(&self, consumer_restarts: u32, heap: HeapStats) -> Option<RestartReason> {
        if consumer_restarts >= self.restart_limit && heap.free < self.restart_floor {
            return Some(RestartReason::MemoryExhausted {
                restarts: consumer_restarts,
                free_heap: heap.free,
            });
        }
        if heap.min_free < self.critical_floor {
            return Some(RestartReason::CriticalHeapFloor {
                min_free_heap: heap.min_free,
            });
        }
        None
    }
}
