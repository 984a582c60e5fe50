//! # SimHost: tokio-backed reference host.
//!
//! Ticks come from [`tokio::time::Instant`], so paused-time tests (`start_paused = true`)
//! drive the clock deterministically. Heap figures are simulated and settable, and
//! allocation/spawn failures can be injected per task kind.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;

use super::{AllocError, HeapStats, Host, ScratchCell, SpawnError, TaskJoin, Tick, ticks};
use crate::core::RestartReason;
use crate::tasks::{BoxTaskFuture, TaskKind};

const NO_HEADROOM: usize = usize::MAX;

/// Simulated host with injectable faults.
pub struct SimHost {
    epoch: Instant,
    free: AtomicUsize,
    min_free: AtomicUsize,
    fail_alloc: AtomicBool,
    fail_spawn: [AtomicBool; TaskKind::COUNT],
    headroom: [AtomicUsize; TaskKind::COUNT],
    restarts: Mutex<Vec<RestartReason>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// Default simulated free heap.
    pub const DEFAULT_FREE_HEAP: usize = 256 * 1024;

    /// Creates a host whose tick clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            free: AtomicUsize::new(Self::DEFAULT_FREE_HEAP),
            min_free: AtomicUsize::new(Self::DEFAULT_FREE_HEAP),
            fail_alloc: AtomicBool::new(false),
            fail_spawn: std::array::from_fn(|_| AtomicBool::new(false)),
            headroom: std::array::from_fn(|_| AtomicUsize::new(NO_HEADROOM)),
            restarts: Mutex::new(Vec::new()),
        }
    }

    /// Starts with the given free heap (also the minimum-ever figure).
    #[must_use]
    pub fn with_free_heap(self, bytes: usize) -> Self {
        self.free.store(bytes, Ordering::Relaxed);
        self.min_free.store(bytes, Ordering::Relaxed);
        self
    }

    /// Sets the current free heap; the minimum-ever figure follows it down.
    pub fn set_free_heap(&self, bytes: usize) {
        self.free.store(bytes, Ordering::Relaxed);
        self.min_free.fetch_min(bytes, Ordering::Relaxed);
    }

    /// Makes every subsequent scratch allocation fail (or succeed again).
    pub fn fail_alloc(&self, fail: bool) {
        self.fail_alloc.store(fail, Ordering::Relaxed);
    }

    /// Makes creation of the given task kind fail (or succeed again).
    pub fn fail_spawn(&self, kind: TaskKind, fail: bool) {
        self.fail_spawn[kind.index()].store(fail, Ordering::Relaxed);
    }

    /// Reports the given stack headroom for a task kind (`None` = unmeasured).
    pub fn set_stack_headroom(&self, kind: TaskKind, words: Option<usize>) {
        self.headroom[kind.index()].store(words.unwrap_or(NO_HEADROOM), Ordering::Relaxed);
    }

    /// Restart requests received so far, oldest first.
    pub fn restart_requests(&self) -> Vec<RestartReason> {
        self.restarts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Simulates the memory side of a reboot: free heap back to `bytes`, faults cleared.
    pub fn reboot(&self, bytes: usize) {
        self.free.store(bytes, Ordering::Relaxed);
        self.min_free.store(bytes, Ordering::Relaxed);
        self.fail_alloc.store(false, Ordering::Relaxed);
    }
}

impl Host for SimHost {
    fn now(&self) -> Tick {
        ticks(self.epoch.elapsed())
    }

    fn spawn(&self, kind: TaskKind, fut: BoxTaskFuture) -> Result<TaskJoin, SpawnError> {
        if self.fail_spawn[kind.index()].load(Ordering::Relaxed) {
            return Err(SpawnError {
                task: kind,
                reason: "injected spawn failure".into(),
            });
        }
        let rt = tokio::runtime::Handle::try_current().map_err(|e| SpawnError {
            task: kind,
            reason: e.to_string(),
        })?;
        Ok(rt.spawn(fut))
    }

    fn heap(&self) -> HeapStats {
        HeapStats {
            free: self.free.load(Ordering::Relaxed),
            min_free: self.min_free.load(Ordering::Relaxed),
        }
    }

    fn alloc_scratch(&self) -> Result<ScratchCell, AllocError> {
        if self.fail_alloc.load(Ordering::Relaxed) {
            return Err(AllocError {
                bytes: size_of::<crate::channel::Message>(),
            });
        }
        ScratchCell::try_new()
    }

    fn stack_headroom(&self, kind: TaskKind) -> Option<usize> {
        match self.headroom[kind.index()].load(Ordering::Relaxed) {
            NO_HEADROOM => None,
            words => Some(words),
        }
    }

    fn restart_device(&self, reason: &RestartReason) {
        self.restarts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reason.clone());
    }
}
