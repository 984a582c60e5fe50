//! # LogWriter: operator status stream
//!
//! Prints one human-readable line per [`Event`] to stdout. The format is advisory; the
//! lines carry enough figures (task, counts, heap) to follow an escalation path from
//! the log alone.
//!
//! ## Example output
//! ```text
//! [boot] started
//! [created] task=producer prio=6
//! [queued] value=0
//! [timeout] task=consumer count=2 timeout=1000ms
//! [escalation] task=consumer count=2 action=warn free=262144 min=262144
//! [status] tick=1500 producer=1500/ok consumer=1400/ok
//! [stalled] task=producer last_seen=0 elapsed=4501ms
//! [recreated] task=producer restarts=1 tick=4501 free=262144 min=262144
//! [heap] free=15360 min=15360
//! [device-restart] reason="free heap 15360 bytes after 3 consumer restarts" free=15360 min=15360
//! ```

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::core::HeartbeatSnapshot;
use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Stdout status stream.
#[derive(Default)]
pub struct LogWriter {
    prefix: Option<String>,
}

impl LogWriter {
    /// Writer without a prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that prefixes every line with `[prefix]` (e.g. a device or boot id).
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Renders the line printed for `e`.
    pub fn format_line(&self, e: &Event) -> String {
        let body = render(e);
        match &self.prefix {
            Some(p) => format!("[{p}] {body}"),
            None => body,
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        println!("{}", self.format_line(e));
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

fn render(e: &Event) -> String {
    let tag = match e.kind {
        EventKind::BootStarted => return "[boot] started".into(),
        EventKind::BootCompleted => return "[boot] completed".into(),
        EventKind::BootFailed => "boot-failed",
        EventKind::ShutdownRequested => return "[shutdown-requested]".into(),
        EventKind::AllStoppedWithin => return "[all-stopped-within-grace]".into(),
        EventKind::GraceExceeded => "grace-exceeded",
        EventKind::TaskCreated => "created",
        EventKind::TaskCreateFailed => "create-failed",
        EventKind::TaskExited => "exited",
        EventKind::TaskStalled => "stalled",
        EventKind::TaskRecreated => "recreated",
        EventKind::MessageQueued => "queued",
        EventKind::MessageDropped => "dropped",
        EventKind::MessageTransmitted => "sent",
        EventKind::StackLow => "stack-low",
        EventKind::ReceiveTimeout => "timeout",
        EventKind::Escalation => "escalation",
        EventKind::AllocFailed => "alloc-failed",
        EventKind::LowMemory => "low-memory",
        EventKind::Status => "status",
        EventKind::HeapReport => "heap",
        EventKind::HeartbeatReport => "heartbeats",
        EventKind::WatchdogExpired => "watchdog-expired",
        EventKind::DeviceRestart => "device-restart",
    };

    let mut line = format!("[{tag}]");
    if let Some(task) = e.task {
        let _ = write!(line, " task={task}");
    }
    if e.kind == EventKind::TaskCreated {
        if let Some(task) = e.task {
            let _ = write!(line, " prio={}", task.priority());
        }
    } else if let Some(n) = e.count {
        let key = if e.kind == EventKind::TaskRecreated {
            "restarts"
        } else {
            "count"
        };
        let _ = write!(line, " {key}={n}");
    }
    if let Some(action) = e.action {
        let _ = write!(line, " action={}", action.as_label());
    }
    if let Some(v) = e.value {
        let _ = write!(line, " value={v}");
    }
    if let Some(ms) = e.timeout_ms {
        let _ = write!(line, " timeout={ms}ms");
    }
    if let Some(tick) = e.tick {
        let key = if e.kind == EventKind::TaskStalled {
            "last_seen"
        } else {
            "tick"
        };
        let _ = write!(line, " {key}={tick}");
    }
    if let Some(ms) = e.elapsed_ms {
        let _ = write!(line, " elapsed={ms}ms");
    }
    if let Some(words) = e.stack_words {
        let _ = write!(line, " stack_words={words}");
    }
    if let Some(hb) = &e.heartbeats {
        render_heartbeats(&mut line, hb);
    }
    if let Some(reason) = &e.reason {
        let _ = write!(line, " reason={reason:?}");
    }
    if let Some(heap) = e.heap {
        let _ = write!(line, " free={} min={}", heap.free, heap.min_free);
    }
    line
}

fn render_heartbeats(line: &mut String, hb: &[HeartbeatSnapshot]) {
    for s in hb {
        let health = if s.healthy { "ok" } else { "unhealthy" };
        let _ = write!(line, " {}={}/{health}", s.task, s.last_seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeapStats;
    use crate::policies::RecoveryAction;
    use crate::tasks::TaskKind;

    #[test]
    fn test_escalation_line_carries_figures() {
        let ev = Event::new(EventKind::Escalation)
            .with_task(TaskKind::Consumer)
            .with_action(RecoveryAction::ResetQueue)
            .with_count(4)
            .with_heap(HeapStats {
                free: 30000,
                min_free: 20000,
            });
        assert_eq!(
            LogWriter::new().format_line(&ev),
            "[escalation] task=consumer count=4 action=reset-queue free=30000 min=20000"
        );
    }

    #[test]
    fn test_status_line_and_prefix() {
        let ev = Event::new(EventKind::Status).with_tick(1500).with_heartbeats(vec![
            HeartbeatSnapshot {
                task: TaskKind::Producer,
                last_seen: 1500,
                healthy: true,
            },
            HeartbeatSnapshot {
                task: TaskKind::Consumer,
                last_seen: 0,
                healthy: false,
            },
        ]);
        assert_eq!(
            LogWriter::with_prefix("dev-1").format_line(&ev),
            "[dev-1] [status] tick=1500 producer=1500/ok consumer=0/unhealthy"
        );
    }

    #[test]
    fn test_created_and_recreated_lines() {
        let w = LogWriter::new();
        let created = Event::new(EventKind::TaskCreated)
            .with_task(TaskKind::Producer)
            .with_count(6);
        assert_eq!(
            w.format_line(&created),
            "[created] task=producer prio=6"
        );

        let recreated = Event::new(EventKind::TaskRecreated)
            .with_task(TaskKind::Consumer)
            .with_count(2)
            .with_tick(3000);
        assert_eq!(
            w.format_line(&recreated),
            "[recreated] task=consumer restarts=2 tick=3000"
        );
    }
}
