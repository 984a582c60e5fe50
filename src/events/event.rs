//! # Runtime events emitted by the tasks, the watchdog and the runtime.
//!
//! [`EventKind`] classifies events into:
//! - **Boot / shutdown**: boot progress, failures and graceful shutdown outcome
//! - **Task management**: creation, exit, staleness and recreation of tasks
//! - **Data path**: queued, dropped and transmitted messages
//! - **Recovery**: receive timeouts, escalation steps, allocation failures
//! - **Telemetry**: status lines, heap reports, heartbeat reports
//! - **Terminal**: watchdog expiry and device restart
//!
//! [`Event`] carries a global sequence number, a wall-clock timestamp and optional
//! metadata set by the publisher. The log stream alone must be enough to reconstruct
//! the escalation path, so recovery events carry task, count and memory figures.
//!
//! ## Example
//! ```rust
//! use rtvisor::{Event, EventKind, RecoveryAction, TaskKind};
//!
//! let ev = Event::new(EventKind::Escalation)
//!     .with_task(TaskKind::Consumer)
//!     .with_action(RecoveryAction::ResetQueue)
//!     .with_count(4);
//!
//! assert_eq!(ev.task, Some(TaskKind::Consumer));
//! assert_eq!(ev.count, Some(4));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::channel::Message;
use crate::core::HeartbeatSnapshot;
use crate::host::{HeapStats, Tick};
use crate::policies::RecoveryAction;
use crate::tasks::TaskKind;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Boot / shutdown ===
    /// Boot sequence started.
    BootStarted,
    /// Every core task was created.
    BootCompleted,
    /// A boot step failed; `reason` names it. Followed by `DeviceRestart`.
    BootFailed,
    /// Shutdown requested (OS signal or shutdown token).
    ShutdownRequested,
    /// All tasks stopped within the grace period.
    AllStoppedWithin,
    /// Grace period exceeded; remaining tasks were aborted.
    GraceExceeded,

    // === Task management ===
    /// A task was created. Sets `task`, `count` (the task's priority).
    TaskCreated,
    /// Task creation failed. Sets `task`, `reason`.
    TaskCreateFailed,
    /// A task instance finished. Sets `task`, `reason` (exit label).
    TaskExited,
    /// Heartbeat older than the staleness window. Sets `task`, `elapsed_ms`, `tick` (last seen).
    TaskStalled,
    /// The supervisor replaced a task. Sets `task`, `count` (restarts so far), `tick`.
    TaskRecreated,

    // === Data path ===
    /// Producer enqueued a value. Sets `value`.
    MessageQueued,
    /// Producer dropped a value on a full channel. Sets `value`.
    MessageDropped,
    /// Consumer transmitted a value. Sets `value`.
    MessageTransmitted,
    /// Stack headroom under the warning threshold. Sets `task`, `stack_words`.
    StackLow,

    // === Recovery ===
    /// Consumer receive timed out. Sets `count`, `timeout_ms`.
    ReceiveTimeout,
    /// An escalation step fired. Sets `task`, `action`, `count`.
    Escalation,
    /// Scratch allocation failed. Sets `task`, `heap`, `reason`.
    AllocFailed,
    /// Free heap under the low-memory threshold. Sets `task`, `heap`.
    LowMemory,

    // === Telemetry ===
    /// Supervisor status line. Sets `heartbeats`, `tick`.
    Status,
    /// Supervisor heap report. Sets `heap`.
    HeapReport,
    /// Logger heartbeat report. Sets `heartbeats`.
    HeartbeatReport,

    // === Terminal ===
    /// A registered task missed its watchdog deadline. Sets `task`, `timeout_ms`.
    WatchdogExpired,
    /// Full device restart requested. Sets `reason`, optionally `heap`.
    DeviceRestart,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task the event is about.
    pub task: Option<TaskKind>,
    /// Host tick relevant to the event.
    pub tick: Option<Tick>,
    /// Message value.
    pub value: Option<Message>,
    /// Counter (consecutive timeouts, restarts); the task priority for `TaskCreated`.
    pub count: Option<u32>,
    /// Escalation step that fired.
    pub action: Option<RecoveryAction>,
    /// Heap telemetry.
    pub heap: Option<HeapStats>,
    /// Stack headroom in words.
    pub stack_words: Option<usize>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Heartbeat table.
    pub heartbeats: Option<Arc<[HeartbeatSnapshot]>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            tick: None,
            value: None,
            count: None,
            action: None,
            heap: None,
            stack_words: None,
            timeout_ms: None,
            elapsed_ms: None,
            reason: None,
            heartbeats: None,
        }
    }

    /// Attaches a task.
    #[inline]
    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }

    /// Attaches a host tick.
    #[inline]
    pub fn with_tick(mut self, tick: Tick) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attaches a message value.
    #[inline]
    pub fn with_value(mut self, value: Message) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches a counter.
    #[inline]
    pub fn with_count(mut self, n: u32) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches an escalation action.
    #[inline]
    pub fn with_action(mut self, action: RecoveryAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Attaches heap telemetry.
    #[inline]
    pub fn with_heap(mut self, heap: HeapStats) -> Self {
        self.heap = Some(heap);
        self
    }

    /// Attaches stack headroom.
    #[inline]
    pub fn with_stack_words(mut self, words: usize) -> Self {
        self.stack_words = Some(words);
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches an elapsed time in milliseconds.
    #[inline]
    pub fn with_elapsed_ms(mut self, ms: u64) -> Self {
        self.elapsed_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a heartbeat table.
    #[inline]
    pub fn with_heartbeats(mut self, hb: Vec<HeartbeatSnapshot>) -> Self {
        self.heartbeats = Some(hb.into());
        self
    }

    /// True for events that describe a recovery action or a terminal decision.
    #[inline]
    pub fn is_recovery(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Escalation
                | EventKind::TaskStalled
                | EventKind::TaskRecreated
                | EventKind::AllocFailed
                | EventKind::WatchdogExpired
                | EventKind::DeviceRestart
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::Status);
        let b = Event::new(EventKind::Status);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_timeout_is_clamped_to_u32() {
        let ev = Event::new(EventKind::ReceiveTimeout).with_timeout(Duration::MAX);
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn test_recovery_classification() {
        assert!(Event::new(EventKind::Escalation).is_recovery());
        assert!(Event::new(EventKind::DeviceRestart).is_recovery());
        assert!(!Event::new(EventKind::MessageQueued).is_recovery());
    }
}
