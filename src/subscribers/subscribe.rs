//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for rendering the status stream: a log
//! sink, a telemetry exporter, or a test recorder.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (a panic is reported on stderr; the worker keeps going)
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only**.
//! - Events are processed sequentially (FIFO) per subscriber.
//! - Subscribers never block the supervised tasks: publishing is `try_send` all the way.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use rtvisor::{Event, EventKind, Subscribe};
//!
//! struct RestartAlarm;
//!
//! #[async_trait]
//! impl Subscribe for RestartAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::DeviceRestart {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "restart-alarm" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of runtime events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order, from the subscriber's own worker.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
