//! # rtvisor
//!
//! **rtvisor** supervises a fixed set of cooperating tasks through heartbeats and an
//! escalating recovery protocol.
//!
//! A producer feeds values into a bounded channel, a consumer drains and "transmits"
//! them, and a supervisor watches both through a heartbeat table. Failures are handled
//! at the cheapest level that works: the consumer first retries on its own, then the
//! supervisor recreates stalled tasks, and only as a last resort the device is
//! restarted.
//!
//! ## Architecture
//! ```text
//!  ┌──────────────┐  try_send   ┌────────────────┐  recv_timeout  ┌──────────────┐
//!  │ Producer (6) ├────────────►│ BoundedChannel ├───────────────►│ Consumer (5) │
//!  └──────┬───────┘             └────────────────┘                └──────┬───────┘
//!         │ stamp                                                        │ stamp
//!         ▼                                                              ▼
//!  ┌─────────────────────────────────────────────────────────────────────────────┐
//!  │                       HeartbeatRegistry (Context)                           │
//!  └───────────────────────────────────┬─────────────────────────────────────────┘
//!                                      │ read every supervisor_period
//!                              ┌───────▼────────┐
//!                              │ Supervisor (4) │── recreate stale / dead workers
//!                              └───────┬────────┘── memory policy ─► restart_device
//!                                      │
//!  Watchdog monitor ── expiry ─────────┼──► RestartLatch ─► Runtime::run() returns
//!  Logger (2) ── periodic report       │
//!                                      ▼
//!  ┌─────────────────────────────────────────────────────────────────────────────┐
//!  │                      Bus (broadcast) ─► SubscriberSet ─► LogWriter / custom │
//!  └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Recovery levels
//! ```text
//! consumer receive timeouts (consecutive):
//!   2 ─► Warn          (report only)
//!   3 ─► SoftRecover   (clear local cache)
//!   4 ─► ResetQueue    (discard queued values)
//!   5 ─► Terminate     (unhealthy, instance exits)
//!
//! supervisor, every 1500 ms:
//!   stale producer / stale or missing consumer ─► destroy + recreate, count restart
//!   consumer restarts ≥ 3 and free heap < 16 KiB ─► device restart
//!   minimum-ever free heap < 8 KiB               ─► device restart
//!
//! watchdog: registered task silent > 5 s          ─► device restart
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                       |
//! |-------------------|-----------------------------------------------------------------|------------------------------------------|
//! | **Runtime**       | Boot, supervision lifetime, graceful shutdown.                  | [`Runtime`], [`RuntimeBuilder`]          |
//! | **Host**          | Platform services: ticks, heap figures, task creation, restart. | [`Host`], [`SimHost`]                    |
//! | **Policies**      | Escalation ladder, staleness windows, memory floors.            | [`EscalationLadder`], [`MemoryPolicy`]   |
//! | **Subscriber API**| Hook into the status stream.                                    | [`Subscribe`], [`Event`]                 |
//! | **Errors**        | Typed errors for the runtime, tasks and configuration.          | [`RuntimeError`], [`TaskError`]          |
//! | **Configuration** | Centralized periods, thresholds and floors.                     | [`Config`]                               |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] status stream.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rtvisor::{Config, Runtime, SimHost, Subscribe};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.logger_period = Duration::from_secs(2);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(rtvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let host = Arc::new(SimHost::new());
//!     let runtime = Runtime::builder(cfg)
//!         .with_host(host.clone())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     // Runs until Ctrl-C or a device restart.
//!     if let Err(e) = runtime.run().await {
//!         eprintln!("{e}");
//!     }
//!     Ok(())
//! }
//! ```

mod channel;
mod core;
mod error;
mod events;
mod host;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use channel::{BoundedChannel, ChannelError, Message, RecvTimeoutError, TrySendError};
pub use core::{
    BootStage, Config, Context, HeartbeatRegistry, HeartbeatSnapshot, RestartLatch,
    RestartReason, Runtime, RuntimeBuilder, TaskExit, TaskHandle, Watchdog, WatchdogError,
    WatchdogGuard, WatchdogSettings,
};
pub use error::{ConfigError, RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use host::{
    AllocError, HeapStats, Host, ScratchCell, SimHost, SpawnError, TaskJoin, Tick, ticks,
};
pub use policies::{
    EscalationLadder, EscalationStep, MemoryPolicy, RecoveryAction, StalenessPolicy, is_stale,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{
    BoxTaskFuture, ConsumerState, ConsumerTask, LoggerTask, ProducerState, ProducerTask,
    Supervisor, SupervisorState, Task, TaskKind, TaskRef,
};

// Optional: built-in stdout status stream.
// Enabled by default; disable with `--no-default-features`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
